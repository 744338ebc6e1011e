//! External collaborators (§6).
//!
//! Out of scope to implement for real (that would mean an HTTP client
//! stack, a provisioning backend, a certificate authority client ...); in
//! scope is the *contract* each reconciler depends on, expressed as a
//! `Send + Sync` async trait, separate from any concrete network
//! implementation. Each trait here ships one in-memory fake used by tests;
//! no production implementation is provided.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::LoadBalancer;

pub mod fakes;

/// `getLoadBalancers`, `deploy`, `serviceConverge`, `activate`/`deactivate`
/// (§6). The core assumes these are idempotent on repeated identical
/// input.
#[async_trait]
pub trait ConfigServer: Send + Sync {
    async fn get_load_balancers(&self, application: &str, zone: &str) -> Result<Vec<LoadBalancer>>;
    async fn deploy(&self, application: &str, zone: &str, package: &[u8]) -> Result<String>;
    async fn service_converge(&self, deployment_id: &str) -> Result<bool>;
    async fn activate(&self, deployment_id: &str) -> Result<()>;
    async fn deactivate(&self, deployment_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ProvisionedHost {
    pub hostname: String,
    pub ip_config: crate::model::IpConfig,
}

/// `provisionHosts`, `deprovision` (§6). Each returned host has a
/// deterministic hostname and ip config.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn provision_hosts(
        &self,
        indices: &[u32],
        host_type: &str,
        resources: &str,
        application: &str,
        os_version: &str,
        sharing: bool,
        cluster_type: &str,
    ) -> Result<Vec<ProvisionedHost>>;

    async fn deprovision(&self, hostname: &str) -> Result<()>;
}

/// `getNodeStatus` (§6). Absence of the hostname is treated as not
/// suspended.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn is_suspended(&self, hostname: &str) -> Result<bool>;
}

/// `requestCaSignedCertificate`, `listCertificates`, `dnsNamesOf` (§6).
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    async fn request_ca_signed_certificate(&self, application: &str, dns_names: &[String]) -> Result<String>;
    async fn list_certificates(&self) -> Result<Vec<String>>;
    async fn dns_names_of(&self, application: &str) -> Result<Vec<String>>;
}

/// `authorize` (§6), consumed by a maintainer with read-only access to
/// tenant records — not modeled further here, the trait is the whole
/// contract this core needs.
#[async_trait]
pub trait ArchiveBucketService: Send + Sync {
    async fn authorize(&self, bucket: &str, tenant: &str) -> Result<String>;
}

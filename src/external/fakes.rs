//! In-memory fakes for the external collaborator traits, used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::model::{IpConfig, LoadBalancer};

use super::{CloudApi, ConfigServer, Orchestrator, ProvisionedHost};

#[derive(Default)]
pub struct FakeConfigServer {
    load_balancers: Mutex<HashMap<(String, String), Vec<LoadBalancer>>>,
}

impl FakeConfigServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load_balancers(&self, application: &str, zone: &str, load_balancers: Vec<LoadBalancer>) {
        self.load_balancers
            .lock()
            .insert((application.to_string(), zone.to_string()), load_balancers);
    }
}

#[async_trait]
impl ConfigServer for FakeConfigServer {
    async fn get_load_balancers(&self, application: &str, zone: &str) -> Result<Vec<LoadBalancer>> {
        Ok(self
            .load_balancers
            .lock()
            .get(&(application.to_string(), zone.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn deploy(&self, _application: &str, _zone: &str, _package: &[u8]) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn service_converge(&self, _deployment_id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn activate(&self, _deployment_id: &str) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&self, _deployment_id: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCloudApi {
    next_index: Mutex<u32>,
}

#[async_trait]
impl CloudApi for FakeCloudApi {
    async fn provision_hosts(
        &self,
        indices: &[u32],
        host_type: &str,
        _resources: &str,
        application: &str,
        _os_version: &str,
        _sharing: bool,
        _cluster_type: &str,
    ) -> Result<Vec<ProvisionedHost>> {
        let mut next = self.next_index.lock();
        let mut hosts = Vec::new();
        for &index in indices {
            let hostname = format!("{}-{}-{}.example.internal", host_type, application, index);
            hosts.push(ProvisionedHost {
                hostname,
                ip_config: IpConfig { primary: vec![format!("10.1.{}.{}", *next / 256, *next % 256)], pool: vec![] },
            });
            *next += 1;
        }
        Ok(hosts)
    }

    async fn deprovision(&self, _hostname: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOrchestrator {
    suspended: Mutex<std::collections::HashSet<String>>,
}

impl FakeOrchestrator {
    pub fn suspend(&self, hostname: &str) {
        self.suspended.lock().insert(hostname.to_string());
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn is_suspended(&self, hostname: &str) -> Result<bool> {
        // "absence of the hostname is treated as not suspended" (§6)
        Ok(self.suspended.lock().contains(hostname))
    }
}

//! Name-Service Forwarder (§2, §6).
//!
//! Queues idempotent DNS change requests with priority and absorbs
//! duplicate requests. May be configured as a no-op for certain zones
//! (e.g. a zone whose records are mirrored by a separate system).

mod queue;

pub use queue::{DnsChangeRequest, Priority, QueuedRequest, RequestQueue};

use std::collections::HashSet;

use parking_lot::Mutex;

/// The forwarder itself: wraps a [`RequestQueue`] with the no-op-zone
/// policy from §2/§6.
pub struct NameServiceForwarder {
    queue: Mutex<RequestQueue>,
    noop_zones: HashSet<String>,
}

impl NameServiceForwarder {
    pub fn new(noop_zones: impl IntoIterator<Item = String>) -> Self {
        NameServiceForwarder {
            queue: Mutex::new(RequestQueue::new()),
            noop_zones: noop_zones.into_iter().collect(),
        }
    }

    fn zone_of(name: &str) -> &str {
        name.splitn(2, '.').nth(1).unwrap_or(name)
    }

    /// Submit a request. Returns `true` if it was newly queued, `false` if
    /// it was absorbed (already pending/applied, or the zone is a no-op
    /// zone). Idempotent callers — i.e. every reconciler — may call this as
    /// often as they like (§4.3: "the reconciler may therefore be invoked
    /// as often as desired").
    pub fn submit(&self, request: DnsChangeRequest, priority: Priority) -> bool {
        if self.noop_zones.contains(Self::zone_of(request.name())) {
            return false;
        }
        let queued = self.queue.lock().push(request.clone(), priority);
        if queued {
            crate::metrics::track_dns_request(request.kind());
        }
        queued
    }

    pub fn create_cname(&self, name: impl Into<String>, data: impl Into<String>, priority: Priority) -> bool {
        self.submit(DnsChangeRequest::CreateCname { name: name.into(), data: data.into() }, priority)
    }

    pub fn create_alias(&self, name: impl Into<String>, targets: Vec<String>, priority: Priority) -> bool {
        self.submit(DnsChangeRequest::CreateAlias { name: name.into(), targets }, priority)
    }

    pub fn remove_records(&self, record_type: impl Into<String>, name: impl Into<String>, priority: Priority) -> bool {
        self.submit(
            DnsChangeRequest::RemoveRecords { record_type: record_type.into(), name: name.into(), data: None },
            priority,
        )
    }

    pub fn pending(&self) -> Vec<QueuedRequest> {
        self.queue.lock().pending()
    }

    pub fn drain(&self) -> Vec<QueuedRequest> {
        self.queue.lock().drain()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! The priority dedup queue backing the forwarder.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DnsChangeRequest {
    CreateCname { name: String, data: String },
    CreateAlias { name: String, targets: Vec<String> },
    RemoveRecords { record_type: String, name: String, data: Option<String> },
}

impl DnsChangeRequest {
    pub fn name(&self) -> &str {
        match self {
            DnsChangeRequest::CreateCname { name, .. } => name,
            DnsChangeRequest::CreateAlias { name, .. } => name,
            DnsChangeRequest::RemoveRecords { name, .. } => name,
        }
    }

    /// The metrics label for this request's kind (§2 ambient stack).
    pub fn kind(&self) -> &'static str {
        match self {
            DnsChangeRequest::CreateCname { .. } => "create_cname",
            DnsChangeRequest::CreateAlias { .. } => "create_alias",
            DnsChangeRequest::RemoveRecords { .. } => "remove_records",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    pub request: DnsChangeRequest,
    pub priority: Priority,
}

/// A priority queue that absorbs duplicate requests by identity
/// (`DnsChangeRequest` equality), so resubmitting the same change is a
/// no-op rather than growing the queue (§2, §6).
#[derive(Default)]
pub struct RequestQueue {
    seen: HashSet<DnsChangeRequest>,
    pending: Vec<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        RequestQueue::default()
    }

    /// Returns `true` if this request was newly queued.
    pub fn push(&mut self, request: DnsChangeRequest, priority: Priority) -> bool {
        if self.seen.contains(&request) {
            return false;
        }
        self.seen.insert(request.clone());
        let position = self.pending.iter().position(|q| q.priority < priority).unwrap_or(self.pending.len());
        self.pending.insert(position, QueuedRequest { request, priority });
        true
    }

    pub fn pending(&self) -> Vec<QueuedRequest> {
        self.pending.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return everything queued, as a forwarder worker would
    /// when flushing to the real name-service backend.
    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_requests_sort_first() {
        let mut queue = RequestQueue::new();
        queue.push(DnsChangeRequest::CreateCname { name: "a".into(), data: "x".into() }, Priority::Low);
        queue.push(DnsChangeRequest::CreateCname { name: "b".into(), data: "x".into() }, Priority::High);
        let pending = queue.pending();
        assert_eq!(pending[0].request.name(), "b");
    }
}

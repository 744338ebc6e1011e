//! Serialization Layer (§2, §4.4): forward/backward-compatible codecs for
//! every durable entity, under the compatibility rules multiple controller
//! replicas running different versions rely on.
//!
//! Rules (§4.4), enforced by convention across every `model` type rather
//! than by a generated schema:
//!
//! 1. Adding a new optional field is always safe — it must be
//!    `Option<T>` with `#[serde(default)]` (or a type whose `Default` is
//!    the right absent-value), so an old reader simply drops the key and a
//!    new reader sees `None` on old bytes.
//! 2. Removing a field requires first shipping a version that stops
//!    *reading* it, then only later a version that stops *writing* it —
//!    never both in the same release.
//! 3. Changing the format or meaning of an existing field is forbidden;
//!    ship a new field instead.
//!
//! [`crate::model::run::ConvergenceSummary`] is the one entity with a
//! *frozen* layout: it is a positional array, not a struct with named
//! fields, specifically so nothing can accidentally add a field to it by
//! the normal struct rule above. A 14th counter needs a new sibling array
//! type, not a resized one.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// `deserialize(serialize(x)) == x` for any durable entity (invariant 7,
/// §8).
pub fn round_trips<T>(value: &T) -> bool
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let bytes = serde_json::to_vec(value).expect("serializable model type");
    let decoded: T = serde_json::from_slice(&bytes).expect("entity must deserialize its own bytes");
    decoded == *value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{Allocation, IpConfig, Node, NodeState, NodeType};
    use crate::model::run::{ConvergenceSummary, Run, RunId, VersionInfo, Versions};
    use serde::{Deserialize, Serialize};

    #[test]
    fn node_round_trips() {
        let mut node = Node::new("h1.example", NodeType::Tenant, NodeState::Reserved);
        node.allocation = Some(Allocation {
            owner: "tenant-a".into(),
            cluster: "default".into(),
            membership_index: 2,
            removable: false,
            restart_generation: 1,
            retired: false,
        });
        node.ip_config = IpConfig { primary: vec!["10.0.0.1".into()], pool: vec![] };
        assert!(round_trips(&node));
    }

    #[test]
    fn run_round_trips() {
        let versions = Versions { target: VersionInfo::default(), source: None };
        let run = Run::new(
            RunId { application: "a".into(), job_type: "prod.r1".into(), number: 1 },
            versions,
            chrono::Utc::now(),
        );
        assert!(round_trips(&run));
    }

    #[test]
    fn convergence_summary_is_a_fixed_length_array() {
        let summary = ConvergenceSummary::new(10, 1, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 2);
        let encoded = serde_json::to_string(&summary).unwrap();
        // Positional, not a JSON object with named keys.
        assert!(encoded.starts_with('['));
        let array: Vec<u32> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(array.len(), ConvergenceSummary::FIELD_COUNT);
    }

    /// Models "version N+1 adds an optional field, version N must still
    /// read its bytes and ignore it" (scenario S6).
    #[test]
    fn new_optional_field_is_ignored_by_old_reader() {
        #[derive(Serialize)]
        struct RunV2 {
            application: String,
            number: u64,
            foo: Option<String>,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        struct RunV1 {
            application: String,
            number: u64,
        }

        let v2 = RunV2 { application: "a".into(), number: 7, foo: Some("new-field".into()) };
        let bytes = serde_json::to_vec(&v2).unwrap();
        let decoded: RunV1 = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, RunV1 { application: "a".into(), number: 7 });
    }

    /// The mirror image: old bytes (missing the new field) must still
    /// deserialize under the new struct, defaulting the field to `None`.
    #[test]
    fn old_bytes_deserialize_under_new_reader() {
        #[derive(Serialize)]
        struct RunV1 {
            application: String,
            number: u64,
        }

        #[derive(Deserialize, PartialEq, Debug)]
        struct RunV2 {
            application: String,
            number: u64,
            #[serde(default)]
            foo: Option<String>,
        }

        let v1 = RunV1 { application: "a".into(), number: 7 };
        let bytes = serde_json::to_vec(&v1).unwrap();
        let decoded: RunV2 = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, RunV2 { application: "a".into(), number: 7, foo: None });
    }

    #[test]
    fn convergence_summary_rejects_wrong_length() {
        let wrong_length = "[1,2,3,4,5,6,7,8,9,10,11,12]"; // 12, not 13
        let array: Result<[u32; 13], _> = serde_json::from_str::<Vec<u32>>(wrong_length)
            .map(|v| v.try_into().map_err(|_| ()))
            .unwrap();
        assert!(array.is_err());
    }
}

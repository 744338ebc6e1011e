//! End-to-end scenarios driving the three reconciliation engines together
//! against the in-process coordination store (§8 scenarios S1-S6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use meridian_controlplane::external::fakes::FakeConfigServer;
use meridian_controlplane::forwarder::NameServiceForwarder;
use meridian_controlplane::model::{
    Allocation, Endpoint, LoadBalancer, LoadBalancerState, Node, NodeState, NodeType, RoutingPolicyId,
    RoutingStatus, RunId, RunStatus, Step, StepStatus, Versions, VersionInfo, Run,
};
use meridian_controlplane::nodes::{Agent, DeallocateReason, NodeLifecycleManager};
use meridian_controlplane::pipeline::{NoopStepHandler, PipelineRunner};
use meridian_controlplane::routing::RoutingPolicyReconciler;
use meridian_controlplane::store::Store;

fn lb(application: &str, zone: &str, hostname: &str) -> LoadBalancer {
    LoadBalancer {
        application: application.to_string(),
        cluster: "default".to_string(),
        zone: zone.to_string(),
        hostname: Some(hostname.to_string()),
        dns_zone: Some(zone.to_string()),
        state: LoadBalancerState::Active,
    }
}

/// S1 - Happy-path deployment.
#[tokio::test]
async fn s1_happy_path_deployment() {
    let store = Arc::new(Store::new());
    let forwarder = Arc::new(NameServiceForwarder::new([]));
    let reconciler = RoutingPolicyReconciler::new(store.clone(), forwarder.clone());
    let config_server = FakeConfigServer::new();
    config_server.set_load_balancers("app-a", "prod.r1", vec![lb("app-a", "prod.r1", "lb1.example.net")]);

    let output = reconciler
        .reconcile(&config_server, "app-a", "default", &["prod.r1".to_string()], &HashSet::new(), &[])
        .await
        .unwrap();
    assert_eq!(output.policies_to_write.len(), 1);
    let stored = store.read_routing_policies(Some("app-a"));
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, RoutingPolicyId::new("app-a", "default", "prod.r1"));

    let Some(Endpoint::Global { targets, .. }) = &output.global_endpoint else { panic!("expected global endpoint") };
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].region, "r1");
    assert_eq!(targets[0].zone_targets[0].weight, 1);

    let runner = PipelineRunner::new(store.clone(), Arc::new(NoopStepHandler), Duration::from_millis(1));
    let id = RunId { application: "app-a".into(), job_type: "prod".into(), number: 1 };
    let versions = Versions { target: VersionInfo::default(), source: None };
    runner.submit_run(Run::new(id.clone(), versions, Utc::now())).unwrap();

    for _ in 0..Step::HAPPY_PATH.len() {
        runner.advance("app-a", "prod").await.unwrap();
    }

    let run = store.read_run(&id).unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.end.is_some());
    assert_eq!(run.steps[&Step::DeactivateReal].status, StepStatus::Unfinished);
    for step in Step::HAPPY_PATH {
        assert_eq!(run.steps[&step].status, StepStatus::Succeeded, "{:?} must have dispatched", step);
    }
}

/// S2 - Routing status OUT then restore.
#[tokio::test]
async fn s2_routing_status_out_then_restore() {
    let store = Arc::new(Store::new());
    let forwarder = Arc::new(NameServiceForwarder::new([]));
    let reconciler = RoutingPolicyReconciler::new(store.clone(), forwarder.clone());
    let config_server = FakeConfigServer::new();
    config_server.set_load_balancers("app-a", "prod.r1", vec![lb("app-a", "prod.r1", "lb1.example.net")]);
    reconciler
        .reconcile(&config_server, "app-a", "default", &["prod.r1".to_string()], &HashSet::new(), &[])
        .await
        .unwrap();

    let id = RoutingPolicyId::new("app-a", "default", "prod.r1");
    let out = reconciler.set_policy_routing_status(&id, RoutingStatus::Out, "tester").await.unwrap();
    let Some(Endpoint::Global { targets, .. }) = &out.global_endpoint else { panic!("expected global endpoint") };
    assert_eq!(
        targets[0].zone_targets[0].weight, 1,
        "NXDOMAIN safety must promote the sole target back to active when no alternative exists"
    );

    let restored = reconciler.set_policy_routing_status(&id, RoutingStatus::In, "tester").await.unwrap();
    let Some(Endpoint::Global { targets, .. }) = &restored.global_endpoint else { panic!("expected global endpoint") };
    assert_eq!(targets[0].zone_targets[0].weight, 1);
    let stored = store.read_routing_policies(Some("app-a"));
    assert_eq!(stored[0].status.routing_status, RoutingStatus::In);
}

/// S3 - Node state machine, full happy path through forget refusal.
#[tokio::test]
async fn s3_node_state_machine() {
    let store = Arc::new(Store::new());
    let manager = NodeLifecycleManager::new(store.clone(), false, false);

    let node = Node::new("n1.example", NodeType::Tenant, NodeState::Provisioned).with_parent("h1.example");
    store.add_nodes_in_state(vec![node], NodeState::Provisioned).unwrap();

    manager.set_ready(&["n1.example".to_string()]).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Ready);

    let allocation = Allocation {
        owner: "tenant-a".into(),
        cluster: "content".into(),
        membership_index: 0,
        removable: false,
        restart_generation: 0,
        retired: false,
    };
    manager.reserve("n1.example", allocation, &Agent::System).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Reserved);

    manager.activate("n1.example", &Agent::System).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Active);

    // "content" cluster is stateful, so a production deactivate goes to inactive.
    manager.deactivate("n1.example", &Agent::System).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Inactive);

    // fail/park are legal from any non-deprovisioned state.
    manager.fail("n1.example", &Agent::System).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Failed);
    manager.park("n1.example", &Agent::System).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Parked);

    // Operator agent bypasses park-on-deallocate even with retirement requested.
    {
        let mut node = store.read_node("n1.example").unwrap();
        node.state = NodeState::Active;
        node.status.want_to_deprovision = true;
        store.write_node(node);
    }
    manager
        .deallocate("n1.example", &Agent::Operator, false, DeallocateReason("operator bypass".into()))
        .await
        .unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Dirty);

    manager.set_ready(&["n1.example".to_string()]).await.unwrap();
    assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Ready);

    let err = manager.forget("n1.example").unwrap_err();
    assert!(matches!(err, meridian_controlplane::ControlPlaneError::InvariantViolation(_)));
}

/// S4 - Park on deallocate.
#[tokio::test]
async fn s4_park_on_deallocate() {
    let store = Arc::new(Store::new());
    let manager = NodeLifecycleManager::new(store.clone(), false, false);

    let allocation = Allocation {
        owner: "tenant-a".into(),
        cluster: "default".into(),
        membership_index: 1,
        removable: false,
        restart_generation: 0,
        retired: false,
    };
    let mut node = Node::new("n2.example", NodeType::Tenant, NodeState::Active).with_parent("h1.example");
    node.allocation = Some(allocation);
    node.status.want_to_deprovision = true;
    store.write_node(node);

    manager
        .deallocate("n2.example", &Agent::System, false, DeallocateReason("host retiring".into()))
        .await
        .unwrap();
    assert_eq!(store.read_node("n2.example").unwrap().state, NodeState::Parked);

    {
        let mut node = store.read_node("n2.example").unwrap();
        node.state = NodeState::Active;
        node.status.want_to_deprovision = false;
        store.write_node(node);
    }
    manager
        .deallocate("n2.example", &Agent::System, false, DeallocateReason("no retirement requested".into()))
        .await
        .unwrap();
    assert_eq!(store.read_node("n2.example").unwrap().state, NodeState::Dirty);
}

/// S5 - Recursive host failure.
#[tokio::test]
async fn s5_recursive_host_failure() {
    let store = Arc::new(Store::new());
    let manager = NodeLifecycleManager::new(store.clone(), false, false);

    store.write_node(Node::new("h.example", NodeType::Host, NodeState::Active));
    store.write_node(Node::new("c1.example", NodeType::Tenant, NodeState::Active).with_parent("h.example"));
    store.write_node(Node::new("c2.example", NodeType::Tenant, NodeState::Active).with_parent("h.example"));
    store.write_node(Node::new("c3.example", NodeType::Tenant, NodeState::Ready).with_parent("h.example"));

    manager.fail_or_mark_recursively("h.example", &Agent::System).await.unwrap();

    let c1 = store.read_node("c1.example").unwrap();
    assert_eq!(c1.state, NodeState::Active);
    assert!(c1.status.want_to_fail);
    let c2 = store.read_node("c2.example").unwrap();
    assert_eq!(c2.state, NodeState::Active);
    assert!(c2.status.want_to_fail);
    let c3 = store.read_node("c3.example").unwrap();
    assert_eq!(c3.state, NodeState::Failed);

    let host = store.read_node("h.example").unwrap();
    assert_eq!(host.state, NodeState::Active, "host stays active while a child is still active");
    assert!(host.status.want_to_fail);

    // Once the active children deactivate (simulated directly here, since
    // deactivation itself is driven by an external collaborator outside
    // this core's scope), a later pass can move the host to failed.
    manager.fail("c1.example", &Agent::System).await.unwrap();
    manager.fail("c2.example", &Agent::System).await.unwrap();
    manager.fail_or_mark_recursively("h.example", &Agent::System).await.unwrap();
    assert_eq!(store.read_node("h.example").unwrap().state, NodeState::Failed);
}

/// S6 - Run serialization compatibility.
#[test]
fn s6_run_serialization_compatibility() {
    use meridian_controlplane::model::ConvergenceSummary;
    use serde::{Deserialize, Serialize};

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

    let v2 = RunV2 { application: "app-a".into(), number: 3, foo: Some("new".into()) };
    let bytes = serde_json::to_vec(&v2).unwrap();
    let decoded: RunV1 = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decoded, RunV1 { application: "app-a".into(), number: 3 });

    let summary = ConvergenceSummary::new(5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 1);
    let encoded = serde_json::to_string(&summary).unwrap();
    let truncated: Vec<u32> = serde_json::from_str::<Vec<u32>>(&encoded).unwrap().into_iter().take(12).collect();
    let rejected: Result<[u32; 13], _> = truncated.try_into();
    assert!(rejected.is_err(), "a 12-element array must not satisfy the frozen 13-field layout");
}

//! Registry behaviour against every store backend.
//!
//! Each test runs once against the in-memory store and once against SQLite.

use std::collections::HashMap;
use std::sync::Arc;

use fleet_registry::{
    MemoryStore, NodeId, NodeInfo, NodeRegistry, NodeState, RegistryError, SqliteStore,
    StoreRegistry,
};
use rstest::rstest;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Memory,
    Sqlite,
}

fn registry(backend: Backend) -> Arc<dyn NodeRegistry> {
    match backend {
        Backend::Memory => Arc::new(StoreRegistry::new(Arc::new(MemoryStore::new()))),
        Backend::Sqlite => Arc::new(StoreRegistry::new(Arc::new(
            SqliteStore::open_in_memory().unwrap(),
        ))),
    }
}

fn node_id(s: &str) -> NodeId {
    NodeId::parse(s).unwrap()
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_save_then_get_returns_equal_record(#[case] backend: Backend) {
    let registry = registry(backend);
    let samples = [
        NodeInfo::new(node_id("n1"), "10.0.0.1"),
        NodeInfo::new(node_id("n2"), "worker-2.example.com")
            .with_mac("aa:bb:cc:dd:ee:ff")
            .with_user("ops")
            .with_ssh_port(2222),
        NodeInfo::new(node_id("n3"), "::1").with_user("root"),
    ];

    for node in samples {
        registry.save_node(node.clone()).await.unwrap();
        assert_eq!(registry.get_node(&node.node_id).await.unwrap(), Some(node));
    }
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_second_save_replaces_first(#[case] backend: Backend) {
    let registry = registry(backend);
    let first = NodeInfo::new(node_id("n1"), "10.0.0.1").with_mac("aa:aa:aa:aa:aa:aa");
    let second = NodeInfo::new(node_id("n1"), "10.0.0.2").with_ssh_port(2200);

    assert!(registry.save_node(first).await.unwrap());
    assert!(!registry.save_node(second.clone()).await.unwrap());

    let nodes = registry.get_nodes().await.unwrap();
    assert_eq!(nodes, vec![second]);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_remove_reports_existence_once(#[case] backend: Backend) {
    let registry = registry(backend);
    let id = node_id("n1");
    registry
        .save_node(NodeInfo::new(id.clone(), "10.0.0.1"))
        .await
        .unwrap();

    assert!(registry.remove_node(&id).await.unwrap());
    assert!(!registry.remove_node(&id).await.unwrap());
    assert!(!registry.has_node(&id).await.unwrap());
    assert_eq!(registry.get_node(&id).await.unwrap(), None);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_first_registration_scenario(#[case] backend: Backend) {
    let registry = registry(backend);
    assert!(registry.get_nodes().await.unwrap().is_empty());

    registry
        .save_node(NodeInfo::new(node_id("n1"), "10.0.0.1"))
        .await
        .unwrap();

    let expected = NodeInfo {
        node_id: node_id("n1"),
        host: "10.0.0.1".to_string(),
        mac: None,
        user: None,
        ssh_port: 22,
    };
    assert_eq!(registry.get_nodes().await.unwrap(), vec![expected]);
    // State stays unknown until a signal or a reconciliation pass.
    assert!(registry.get_node_states().await.unwrap().is_empty());
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_states_roundtrip_and_follow_removal(#[case] backend: Backend) {
    let registry = registry(backend);
    for id in ["n1", "n2", "n3"] {
        registry
            .save_node(NodeInfo::new(node_id(id), "10.0.0.1"))
            .await
            .unwrap();
    }

    registry
        .set_node_state(&node_id("n1"), NodeState::Online)
        .await
        .unwrap();
    registry
        .set_node_states(HashMap::from([
            (node_id("n2"), NodeState::Offline),
            (node_id("n1"), NodeState::Offline),
        ]))
        .await
        .unwrap();

    let states = registry.get_node_states().await.unwrap();
    assert_eq!(
        states,
        HashMap::from([
            (node_id("n1"), NodeState::Offline),
            (node_id("n2"), NodeState::Offline),
        ])
    );

    registry.remove_node(&node_id("n1")).await.unwrap();
    let states = registry.get_node_states().await.unwrap();
    assert!(!states.contains_key(&node_id("n1")));
    assert_eq!(states.len(), 1);
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_state_writes_never_outlive_the_node(#[case] backend: Backend) {
    let registry = registry(backend);
    let n1 = node_id("n1");
    let ghost = node_id("ghost");
    registry
        .save_node(NodeInfo::new(n1.clone(), "10.0.0.1"))
        .await
        .unwrap();
    assert!(registry.remove_node(&n1).await.unwrap());

    // A reconciliation pass that listed n1 before it was removed.
    registry
        .set_node_states(HashMap::from([
            (n1.clone(), NodeState::Offline),
            (ghost.clone(), NodeState::Online),
        ]))
        .await
        .unwrap();
    assert!(matches!(
        registry.set_node_state(&n1, NodeState::Online).await,
        Err(RegistryError::UnknownNode(_))
    ));

    assert!(registry
        .save_node(NodeInfo::new(n1.clone(), "10.0.0.1"))
        .await
        .unwrap());
    assert!(registry
        .save_node(NodeInfo::new(ghost.clone(), "10.0.0.2"))
        .await
        .unwrap());

    // Both start unknown again.
    assert!(registry.get_node_states().await.unwrap().is_empty());
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_state_batch_records_only_registered_nodes(#[case] backend: Backend) {
    let registry = registry(backend);
    registry
        .save_node(NodeInfo::new(node_id("n1"), "10.0.0.1"))
        .await
        .unwrap();

    registry
        .set_node_states(HashMap::from([
            (node_id("n1"), NodeState::Online),
            (node_id("n2"), NodeState::Online),
        ]))
        .await
        .unwrap();

    assert_eq!(
        registry.get_node_states().await.unwrap(),
        HashMap::from([(node_id("n1"), NodeState::Online)])
    );
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_get_nodes_sorted_by_id(#[case] backend: Backend) {
    let registry = registry(backend);
    for id in ["c", "a", "b"] {
        registry
            .save_node(NodeInfo::new(node_id(id), "h"))
            .await
            .unwrap();
    }

    let ids: Vec<_> = registry
        .get_nodes()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.node_id.to_string())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(
        registry.node_ids().await.unwrap(),
        vec![node_id("a"), node_id("b"), node_id("c")]
    );
}

#[rstest]
#[case::memory(Backend::Memory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test]
async fn test_unknown_node_errors(#[case] backend: Backend) {
    let registry = registry(backend);
    let ghost = node_id("ghost");

    assert!(matches!(
        registry.require_node(&ghost).await,
        Err(RegistryError::UnknownNode(_))
    ));
    assert!(matches!(
        registry.set_node_state(&ghost, NodeState::Online).await,
        Err(RegistryError::UnknownNode(_))
    ));
}

#[tokio::test]
async fn test_concurrent_saves_leave_consistent_index() {
    let registry = registry(Backend::Sqlite);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move {
            let id = node_id(&format!("n{}", i % 8));
            registry
                .save_node(NodeInfo::new(id, format!("10.0.0.{i}")))
                .await
                .unwrap()
        });
    }

    let mut creates = 0;
    while let Some(created) = tasks.join_next().await {
        if created.unwrap() {
            creates += 1;
        }
    }

    // Exactly one save per id observed a create.
    assert_eq!(creates, 8);
    assert_eq!(registry.get_nodes().await.unwrap().len(), 8);
}

//! Health monitoring and rebuild

use std::sync::Arc;
use std::time::Duration;

use dbcluster::config::parse_clusters;
use dbcluster::{
    Backend, Cluster, ConfigProvider, FileConfig, GroupBuilder, GroupRegistry, HealthMonitor,
    MonitorState, PoolTuning, Router, StaticConfig,
};

use crate::{static_config, CountingBackend, CountingDialer};

const TWO: &str = r#"
    [clusters.orders]
    master = "dsn-orders"
    replica1 = "dsn-orders-r1"

    [clusters.users]
    master = "dsn-users"
"#;

/// Wait until `check` holds, polling every few milliseconds
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

struct Harness {
    dialer: Arc<CountingDialer>,
    config: Arc<StaticConfig>,
    registry: Arc<GroupRegistry<CountingBackend>>,
}

impl Harness {
    /// Build and install every configured group without starting monitors
    async fn new(doc: &str) -> Self {
        let dialer = CountingDialer::new();
        let config = static_config(doc);
        let registry: Arc<GroupRegistry<CountingBackend>> = Arc::new(GroupRegistry::new());
        let builder = GroupBuilder::new(dialer.clone());

        let instances = parse_clusters(&config.load().unwrap()).unwrap();
        for (name, instance) in &instances {
            let group = builder
                .build(name, instance, &PoolTuning::default())
                .await
                .unwrap();
            registry.put(name.clone(), group);
        }

        Self {
            dialer,
            config,
            registry,
        }
    }

    fn monitor(&self, instance: &str) -> HealthMonitor<CountingDialer> {
        HealthMonitor::new(
            instance,
            self.registry.clone(),
            GroupBuilder::new(self.dialer.clone()),
            self.config.clone(),
        )
    }
}

#[tokio::test]
async fn test_failure_and_recovery_sequence() {
    let h = Harness::new(TWO).await;
    let monitor = h.monitor("orders");
    let router = Router::new(h.registry.clone());
    let dead = h.registry.get("orders").unwrap();

    let mut states = vec![monitor.state()];
    states.push(monitor.tick().await);
    states.push(monitor.tick().await);

    dead.primary().set_alive(false);
    states.push(monitor.tick().await);

    // Until the rebuild lands, callers still get the dead handle
    let stale = router.resolve("orders", "master").unwrap();
    assert!(Arc::ptr_eq(&stale, &dead.primary()));

    states.push(monitor.tick().await);

    assert_eq!(
        states,
        vec![
            MonitorState::Healthy,
            MonitorState::Healthy,
            MonitorState::Healthy,
            MonitorState::Rebuilding,
            MonitorState::Healthy,
        ]
    );

    let fresh = router.resolve("orders", "master").unwrap();
    assert!(!Arc::ptr_eq(&fresh, &dead.primary()));
    assert_eq!(fresh.dsn(), "dsn-orders");
    assert_eq!(h.dialer.opened("dsn-orders").len(), 2);
}

#[tokio::test]
async fn test_replaced_group_closed_exactly_once() {
    let h = Harness::new(TWO).await;
    let monitor = h.monitor("orders");
    let dead = h.registry.get("orders").unwrap();
    dead.primary().set_alive(false);

    assert_eq!(monitor.tick().await, MonitorState::Rebuilding);
    assert_eq!(monitor.tick().await, MonitorState::Healthy);
    for _ in 0..3 {
        assert_eq!(monitor.tick().await, MonitorState::Healthy);
    }

    // The old group is closed in the background
    eventually(|| dead.primary().closes() == 1 && dead.replicas()[0].closes() == 1).await;
    assert!(dead.is_closed());
    for _ in 0..3 {
        monitor.tick().await;
    }
    tokio::task::yield_now().await;
    assert_eq!(dead.primary().closes(), 1);

    // The replacement is untouched
    let current = h.registry.get("orders").unwrap();
    assert_eq!(current.primary().closes(), 0);
}

#[tokio::test]
async fn test_one_instance_failing_leaves_others_alone() {
    let h = Harness::new(TWO).await;
    let orders = h.monitor("orders");
    let users = h.monitor("users");
    let users_group = h.registry.get("users").unwrap();

    h.registry.get("orders").unwrap().primary().set_alive(false);
    for _ in 0..4 {
        orders.tick().await;
        assert_eq!(users.tick().await, MonitorState::Healthy);
    }

    assert!(Arc::ptr_eq(&users_group, &h.registry.get("users").unwrap()));
    assert_eq!(h.dialer.opened("dsn-users").len(), 1);
    // One failure, one rebuild
    assert_eq!(h.dialer.opened("dsn-orders").len(), 2);
    assert_eq!(users_group.primary().closes(), 0);
}

#[tokio::test]
async fn test_rebuild_retries_until_dial_succeeds() {
    let h = Harness::new(TWO).await;
    let monitor = h.monitor("orders");
    h.registry.get("orders").unwrap().primary().set_alive(false);
    h.dialer.fail("dsn-orders-r1", 3);

    let mut states = Vec::new();
    for _ in 0..5 {
        states.push(monitor.tick().await);
    }

    assert_eq!(
        states,
        vec![
            MonitorState::Rebuilding,
            MonitorState::Rebuilding,
            MonitorState::Rebuilding,
            MonitorState::Rebuilding,
            MonitorState::Healthy,
        ]
    );

    // Every failed attempt released its half-built group
    let primaries = h.dialer.opened("dsn-orders");
    assert_eq!(primaries.len(), 5);
    for partial in &primaries[1..4] {
        assert_eq!(partial.closes(), 1);
    }
    assert_eq!(primaries[4].closes(), 0);
}

#[tokio::test]
async fn test_rebuild_picks_up_new_connection_strings() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, TWO.as_bytes()).unwrap();

    let dialer = CountingDialer::new();
    let cluster = Cluster::builder(Arc::new(FileConfig::new(file.path())), dialer.clone())
        .tick_interval(Duration::from_millis(10))
        .init()
        .await
        .expect("init should succeed");

    std::fs::write(
        file.path(),
        r#"
        [clusters.orders]
        master = "dsn-orders-moved"

        [clusters.users]
        master = "dsn-users"
        "#,
    )
    .unwrap();
    cluster
        .registry()
        .get("orders")
        .unwrap()
        .primary()
        .set_alive(false);

    let registry = cluster.registry().clone();
    eventually(|| {
        registry
            .get("orders")
            .map(|g| g.primary().dsn() == "dsn-orders-moved")
            .unwrap_or(false)
    })
    .await;

    assert_eq!(
        cluster.resolve("orders", "slave").unwrap().dsn(),
        "dsn-orders-moved"
    );
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_cluster_monitors_report_state() {
    let dialer = CountingDialer::new();
    let cluster = Cluster::builder(static_config(TWO), dialer.clone())
        .tick_interval(Duration::from_millis(10))
        .init()
        .await
        .expect("init should succeed");

    let rx = cluster.subscribe("orders").unwrap();
    let dead = cluster.registry().get("orders").unwrap();
    dead.primary().set_alive(false);

    eventually(|| dead.is_closed() && *rx.borrow() == MonitorState::Healthy).await;
    assert_eq!(cluster.monitor_state("users"), Some(MonitorState::Healthy));
    assert_eq!(dialer.opened("dsn-orders").len(), 2);
    cluster.shutdown().await;

    for backend in dialer.all_opened() {
        assert_eq!(backend.closes(), 1, "{} should be closed once", backend.dsn());
    }
}

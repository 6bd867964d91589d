//! 服务运行时端到端集成测试
use anyhow::Result;
use async_trait::async_trait;
use di_abstractions::{DependencyGraph, ServiceRegistry, ServiceResolver};
use di_impl::{LifecycleManagerOptions, SERVICE_HEALTH_CHECK, SERVICE_REGISTERED};
use infrastructure_common::{
    BoxError, DependencyError, EventBusError, HealthCheckable, HealthStatus, InfrastructureError,
    Lifecycle, LifecycleError, ServiceMetadata, ServiceStatus,
};
use infrastructure_composition::{RuntimeBuilder, ServiceRuntime};
use messaging_abstractions::{event_listener, wait_filter, EventPattern};
use messaging_impl::EventBus;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

/// 记录启停顺序的测试服务
struct JournaledService {
    name: &'static str,
    journal: Journal,
    fail_start: bool,
}

impl JournaledService {
    fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
            fail_start: false,
        })
    }

    fn failing(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
            fail_start: true,
        })
    }
}

#[async_trait]
impl Lifecycle for JournaledService {
    async fn on_start(&self) -> Result<(), BoxError> {
        self.journal.lock().push(format!("start:{}", self.name));
        if self.fail_start {
            return Err(format!("{} 无法连接", self.name).into());
        }
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.journal.lock().push(format!("stop:{}", self.name));
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for JournaledService {
    async fn check_health(&self) -> Result<HealthStatus, BoxError> {
        Ok(HealthStatus::healthy())
    }
}

fn runtime() -> Result<ServiceRuntime> {
    Ok(RuntimeBuilder::new()
        .with_lifecycle_options(LifecycleManagerOptions::default().with_health_check_interval(None))
        .build()?)
}

fn recorder(log: &Journal, label: &'static str) -> messaging_abstractions::EventListener {
    let log = log.clone();
    event_listener(move |_| {
        let log = log.clone();
        async move {
            log.lock().push(label.to_string());
            Ok(())
        }
    })
}

async fn register_platform(
    runtime: &ServiceRuntime,
    journal: &Journal,
    db_fails: bool,
) -> Result<()> {
    let db = if db_fails {
        JournaledService::failing("DB", journal)
    } else {
        JournaledService::new("DB", journal)
    };
    runtime
        .register(db, ServiceMetadata::new("DB", "1.0.0").with_priority(10))
        .await?;
    runtime
        .register(
            JournaledService::new("Cache", journal),
            ServiceMetadata::new("Cache", "1.0.0").with_priority(20),
        )
        .await?;
    runtime
        .register(
            JournaledService::new("Users", journal),
            ServiceMetadata::new("Users", "1.0.0")
                .with_priority(30)
                .with_dependencies(["DB", "Cache"]),
        )
        .await?;
    Ok(())
}

#[test]
fn test_initialization_order_respects_every_edge() -> Result<()> {
    let mut graph = DependencyGraph::new();
    let edges = [
        ("api", "auth"),
        ("api", "catalog"),
        ("auth", "db"),
        ("catalog", "db"),
        ("catalog", "cache"),
        ("worker", "queue"),
        ("queue", "db"),
    ];
    for (service, dependency) in edges {
        graph.add_service(service, 0);
        graph.add_dependency(service, dependency)?;
    }

    let order = graph.get_initialization_order()?;
    let position = |name: &str| order.iter().position(|n| n == name);
    for (service, dependency) in edges {
        assert!(position(dependency) < position(service), "{} 应在 {} 之前", dependency, service);
    }

    let mut shutdown = graph.get_shutdown_order()?;
    shutdown.reverse();
    assert_eq!(shutdown, order);
    Ok(())
}

#[tokio::test]
async fn test_circular_registration_leaves_no_trace() -> Result<()> {
    let runtime = runtime()?;
    let journal = Journal::default();

    for (name, dependency) in [("A", "B"), ("B", "C")] {
        runtime
            .register(
                JournaledService::new(name, &journal),
                ServiceMetadata::new(name, "1.0.0").with_dependency(dependency),
            )
            .await?;
    }
    let graph_before = runtime.manager().dependency_graph().await;

    let error = runtime
        .register(
            JournaledService::new("C", &journal),
            ServiceMetadata::new("C", "1.0.0").with_dependency("A"),
        )
        .await
        .unwrap_err();

    match error {
        InfrastructureError::LifecycleError {
            source: LifecycleError::Dependency(DependencyError::CircularDependency { path }),
        } => assert_eq!(path, vec!["A", "B", "C", "A"]),
        other => panic!("意外的错误: {}", other),
    }
    assert_eq!(runtime.manager().get_all_services().await.len(), 2);
    assert_eq!(runtime.manager().dependency_graph().await, graph_before);
    assert!(!runtime.resolver().has("C").await);
    Ok(())
}

#[tokio::test]
async fn test_platform_starts_in_dependency_order_and_stops_in_reverse() -> Result<()> {
    let runtime = runtime()?;
    let journal = Journal::default();
    register_platform(&runtime, &journal, false).await?;

    runtime.start().await?;
    assert_eq!(*journal.lock(), vec!["start:DB", "start:Cache", "start:Users"]);
    for name in ["DB", "Cache", "Users"] {
        let registration = runtime
            .manager()
            .get_service_by_name(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("服务未注册: {}", name))?;
        assert_eq!(registration.status, ServiceStatus::Active);
    }
    assert!(runtime.resolver().resolve("Users").await.is_ok());

    journal.lock().clear();
    let report = runtime.stop().await?;
    assert!(report.is_clean());
    assert_eq!(*journal.lock(), vec!["stop:Users", "stop:Cache", "stop:DB"]);
    Ok(())
}

#[tokio::test]
async fn test_failed_dependency_aborts_startup() -> Result<()> {
    let runtime = runtime()?;
    let journal = Journal::default();
    register_platform(&runtime, &journal, true).await?;

    let error = runtime.start().await.unwrap_err();
    match error {
        InfrastructureError::LifecycleError {
            source: LifecycleError::InitializationFailed { name, dependents, .. },
        } => {
            assert_eq!(name, "DB");
            assert_eq!(dependents, vec!["Users"]);
        }
        other => panic!("意外的错误: {}", other),
    }
    assert_eq!(*journal.lock(), vec!["start:DB"]);

    let users = runtime
        .manager()
        .get_service_by_name("Users")
        .await
        .ok_or_else(|| anyhow::anyhow!("Users 未注册"))?;
    assert_eq!(users.status, ServiceStatus::Registered);
    assert!(matches!(
        runtime.resolver().resolve("DB").await,
        Err(DependencyError::ServiceNotActive { status: ServiceStatus::Error, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_listener_priority_order() -> Result<()> {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for priority in [30, 10, 20] {
        let label: &'static str = match priority {
            10 => "10",
            20 => "20",
            _ => "30",
        };
        bus.on_with_priority("order.created", priority, recorder(&log, label));
    }

    assert_eq!(bus.emit("order.created", json!({})).await?, 3);
    assert_eq!(*log.lock(), vec!["10", "20", "30"]);
    Ok(())
}

#[tokio::test]
async fn test_once_listener_fires_exactly_once() -> Result<()> {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.once("cache.warmed", recorder(&log, "once"));

    for _ in 0..3 {
        bus.emit("cache.warmed", json!({})).await?;
    }

    assert_eq!(log.lock().len(), 1);
    assert_eq!(bus.listener_count("cache.warmed"), 0);
    Ok(())
}

#[tokio::test]
async fn test_wait_for_filters_and_times_out() -> Result<()> {
    let bus = EventBus::new();
    let large_payment = bus.wait_for(
        "payment.processed",
        Duration::from_millis(5000),
        Some(wait_filter(|data: &Value| {
            data["amount"].as_f64().map_or(false, |amount| amount > 100.0)
        })),
    );

    bus.emit("payment.processed", json!({ "amount": 40 })).await?;
    bus.emit("payment.processed", json!({ "amount": 250 })).await?;
    bus.emit("payment.processed", json!({ "amount": 900 })).await?;

    let data = large_payment.await?;
    assert_eq!(data["amount"], 250);

    let missing = bus.wait_for("payment.refunded", Duration::from_millis(30), None);
    let error = missing.await.unwrap_err();
    assert!(matches!(error, EventBusError::WaiterTimeout { timeout_ms: 30, .. }));
    bus.emit("payment.refunded", json!({})).await?;
    assert_eq!(bus.pending_waiters(), 0);
    Ok(())
}

#[test]
fn test_wildcard_patterns() -> Result<()> {
    let single = EventPattern::new("user.*")?;
    assert!(single.matches("user.created"));
    assert!(single.matches("user.updated"));
    assert!(!single.matches("user.profile.created"));
    assert!(!single.matches("order.created"));

    let everything = EventPattern::new("**")?;
    for event in ["user", "user.created", "a.b.c.d", "service:status:changed"] {
        assert!(everything.matches(event), "{} 应匹配 **", event);
    }
    Ok(())
}

#[tokio::test]
async fn test_scoped_bus_delivers_exactly_once() -> Result<()> {
    let bus = EventBus::new();
    let scoped = bus.create_scoped("user");
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.on("user:login", recorder(&log, "parent"));
    scoped.on("login", recorder(&log, "scoped"));

    let delivered = scoped.emit("login", json!({ "userId": 7 })).await?;

    assert_eq!(delivered, 2);
    let mut seen = log.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["parent", "scoped"]);
    Ok(())
}

#[tokio::test]
async fn test_lifecycle_events_are_published_on_runtime_bus() -> Result<()> {
    let runtime = runtime()?;
    let registered = Arc::new(AtomicUsize::new(0));
    let health_checks = Arc::new(AtomicUsize::new(0));
    for (event, counter) in [
        (SERVICE_REGISTERED, registered.clone()),
        (SERVICE_HEALTH_CHECK, health_checks.clone()),
    ] {
        runtime.event_bus().on(
            event,
            event_listener(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
    }

    let journal = Journal::default();
    register_platform(&runtime, &journal, false).await?;
    runtime.start().await?;
    assert!(runtime.overall_health().await.is_healthy());

    assert_eq!(registered.load(Ordering::SeqCst), 3);
    assert_eq!(health_checks.load(Ordering::SeqCst), 3);
    assert!(!runtime
        .event_bus()
        .get_history(Some(SERVICE_REGISTERED), None)
        .is_empty());

    runtime.stop().await?;
    Ok(())
}

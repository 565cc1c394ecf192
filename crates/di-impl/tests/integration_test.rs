//! 依赖注入引擎的集成测试

use di_abstractions::{ComponentRegistration, ContainerConfig, ResolverExt};
use di_common::{BoxError, Component, DiError, TypeInfo};
use di_impl::{Context, EventHookManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 测试组件
#[derive(Debug)]
struct TestService {
    name: String,
}

impl Component for TestService {}

#[derive(Debug)]
struct RequestId(usize);
impl Component for RequestId {}

#[derive(Debug)]
struct Slow;
impl Component for Slow {}

#[derive(Debug)]
struct X;
impl Component for X {}

#[derive(Debug)]
struct Y;
impl Component for Y {}

#[derive(Debug)]
struct Z;
impl Component for Z {}

#[derive(Debug)]
struct Shard<const N: usize>;
impl<const N: usize> Component for Shard<N> {}

fn built(context: Context) -> Context {
    context.mark_built().unwrap();
    context
}

#[tokio::test]
async fn test_singleton_resolves_to_same_instance() {
    let context = Context::new("core");
    context
        .register(
            ComponentRegistration::builder::<TestService>()
                .constructor(|_| Ok::<_, BoxError>(TestService { name: "test".into() })),
        )
        .unwrap();
    let context = built(context);

    let first = context.resolve::<TestService>().await.unwrap();
    let second = context.resolve::<TestService>().await.unwrap();

    assert_eq!(first.name, "test");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(context.is_registered_type::<TestService>());
    assert_eq!(context.get_registered_types(), vec![TypeInfo::of::<TestService>()]);
}

#[tokio::test]
async fn test_transient_resolves_to_distinct_instances() {
    let counter = Arc::new(AtomicUsize::new(0));
    let context = Context::new("core");
    let next = counter.clone();
    context
        .register(
            ComponentRegistration::builder::<RequestId>()
                .transient()
                .constructor(move |_| Ok::<_, BoxError>(RequestId(next.fetch_add(1, Ordering::SeqCst)))),
        )
        .unwrap();
    let context = built(context);

    let first = context.resolve::<RequestId>().await.unwrap();
    let second = context.resolve::<RequestId>().await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.0, second.0);
    assert_eq!(context.stats().active_singletons, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_constructed_once() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let context = Context::new("core");
    let counter = constructions.clone();
    context
        .register(ComponentRegistration::builder::<Slow>().factory(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(Slow)
            }
        }))
        .unwrap();
    let context = built(context);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let context = context.clone();
            tokio::spawn(async move { context.resolve::<Slow>().await })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_waiters_share_construction_error() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let context = Context::new("core");
    let counter = constructions.clone();
    context
        .register(ComponentRegistration::builder::<Slow>().factory(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<Slow, BoxError>("database unreachable".into())
            }
        }))
        .unwrap();
    let context = built(context);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let context = context.clone();
            tokio::spawn(async move { context.resolve::<Slow>().await })
        })
        .collect();

    let mut errors = Vec::new();
    for handle in handles {
        errors.push(handle.await.unwrap().unwrap_err());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(errors.iter().all(|error| error == &errors[0]));
    assert!(errors[0].to_string().contains("database unreachable"));

    // 失败的构造不会被缓存
    assert!(context.resolve::<Slow>().await.is_err());
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_circular_dependency_reports_full_chain() {
    let config = ContainerConfig {
        enable_circular_dependency_detection: false,
        ..ContainerConfig::default()
    };
    let context = Context::with_config("core", config, EventHookManager::shared());
    context
        .register(
            ComponentRegistration::builder::<X>()
                .depends_on::<Y>()
                .constructor(|_| Ok::<_, BoxError>(X)),
        )
        .unwrap();
    context
        .register(
            ComponentRegistration::builder::<Y>()
                .depends_on::<X>()
                .constructor(|_| Ok::<_, BoxError>(Y)),
        )
        .unwrap();
    let context = built(context);

    let error = context.resolve::<X>().await.unwrap_err();
    assert_eq!(
        error,
        DiError::CircularDependency {
            chain: vec!["X".into(), "Y".into(), "X".into()],
            context: "core".into(),
        }
    );
}

#[tokio::test]
async fn test_build_rejects_circular_dependency() {
    let context = Context::new("core");
    context
        .register(
            ComponentRegistration::builder::<X>()
                .depends_on::<Y>()
                .constructor(|_| Ok::<_, BoxError>(X)),
        )
        .unwrap();
    context
        .register(
            ComponentRegistration::builder::<Y>()
                .depends_on::<X>()
                .constructor(|_| Ok::<_, BoxError>(Y)),
        )
        .unwrap();

    let error = context.mark_built().unwrap_err();
    assert!(error.is_circular());
    assert!(error.to_string().contains("X -> Y -> X"));
}

#[tokio::test]
async fn test_dependencies_resolved_in_declared_order() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let context = Context::new("core");

    let y_log = log.clone();
    context
        .register(ComponentRegistration::builder::<Y>().transient().constructor(move |_| {
            y_log.lock().push("Y");
            Ok::<_, BoxError>(Y)
        }))
        .unwrap();
    let z_log = log.clone();
    context
        .register(ComponentRegistration::builder::<Z>().transient().constructor(move |_| {
            z_log.lock().push("Z");
            Ok::<_, BoxError>(Z)
        }))
        .unwrap();
    context
        .register(
            ComponentRegistration::builder::<X>()
                .transient()
                .depends_on::<Z>()
                .depends_on::<Y>()
                .constructor(|deps| {
                    assert_eq!(deps.types(), vec![TypeInfo::of::<Z>(), TypeInfo::of::<Y>()]);
                    deps.get::<Z>()?;
                    deps.get::<Y>()?;
                    Ok::<_, BoxError>(X)
                }),
        )
        .unwrap();
    let context = built(context);

    context.resolve::<X>().await.unwrap();
    assert_eq!(*log.lock(), vec!["Z", "Y"]);
}

#[tokio::test]
async fn test_scoped_instances_live_per_frame() {
    let context = Context::new("web");
    context
        .register(
            ComponentRegistration::builder::<TestService>()
                .scoped()
                .constructor(|_| Ok::<_, BoxError>(TestService { name: "request".into() })),
        )
        .unwrap();
    let context = built(context);

    let error = context.resolve::<TestService>().await.unwrap_err();
    assert!(matches!(error, DiError::ScopeNotActive { .. }));

    context.enter_scope("request-1");
    let first = context.resolve::<TestService>().await.unwrap();
    let again = context.resolve::<TestService>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    context.exit_scope("request-1").await.unwrap();

    context.enter_scope("request-2");
    let second = context.resolve::<TestService>().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(context.active_scope().map(|scope| scope.name), Some("request-2".to_string()));
    context.exit_scope("request-2").await.unwrap();
}

#[tokio::test]
async fn test_unexported_type_resolves_locally_only() {
    let context = Context::new("billing");
    context
        .register(ComponentRegistration::builder::<X>().constructor(|_| Ok::<_, BoxError>(X)))
        .unwrap();
    context
        .register(ComponentRegistration::builder::<Y>().constructor(|_| Ok::<_, BoxError>(Y)))
        .unwrap();
    context.add_export(TypeInfo::of::<X>()).unwrap();
    let context = built(context);

    assert!(context.resolve::<Y>().await.is_ok());
    let error = context.get_exported::<Y>().await.unwrap_err();
    assert_eq!(
        error,
        DiError::ExportNotAllowed {
            type_name: "Y".into(),
            context: "billing".into()
        }
    );
    assert!(context.get_exported::<X>().await.is_ok());
    assert!(context.can_export(&TypeInfo::of::<X>()));
    assert!(!context.can_export(&TypeInfo::of::<Y>()));
}

#[tokio::test]
async fn test_timeout_stops_waiting_but_construction_completes() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let config = ContainerConfig::default().with_resolution_timeout_ms(Some(20));
    let context = Context::with_config("core", config, EventHookManager::shared());
    let counter = constructions.clone();
    context
        .register(ComponentRegistration::builder::<Slow>().factory(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, BoxError>(Slow)
            }
        }))
        .unwrap();
    let context = built(context);

    let error = context.resolve::<Slow>().await.unwrap_err();
    assert!(matches!(error, DiError::ResolutionTimeout { timeout_ms: 20, .. }));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(context.resolve::<Slow>().await.is_ok());
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resolution_depth_limit() {
    let config = ContainerConfig::default().with_max_resolution_depth(2);
    let context = Context::with_config("core", config, EventHookManager::shared());
    context
        .register(
            ComponentRegistration::builder::<X>()
                .depends_on::<Y>()
                .constructor(|_| Ok::<_, BoxError>(X)),
        )
        .unwrap();
    context
        .register(
            ComponentRegistration::builder::<Y>()
                .depends_on::<Z>()
                .constructor(|_| Ok::<_, BoxError>(Y)),
        )
        .unwrap();
    context
        .register(ComponentRegistration::builder::<Z>().constructor(|_| Ok::<_, BoxError>(Z)))
        .unwrap();
    let context = built(context);

    let error = context.resolve::<X>().await.unwrap_err();
    assert!(matches!(error, DiError::ResolutionDepthExceeded { max_depth: 2, .. }));
    assert!(context.resolve::<Z>().await.is_ok());
}

#[tokio::test]
async fn test_resolver_trait_surface() {
    let context = Context::new("core");
    context
        .register(
            ComponentRegistration::builder::<TestService>()
                .named("service")
                .constructor(|_| Ok::<_, BoxError>(TestService { name: "named".into() })),
        )
        .unwrap();
    let context = built(context);

    let resolver: &dyn di_abstractions::ComponentResolver = &context;
    assert!(resolver.can_resolve(&TypeInfo::of::<TestService>()));
    assert_eq!(resolver.resolver_name(), "core");

    let instance = resolver.resolve_by_name("service").await.unwrap();
    assert_eq!(instance.downcast::<TestService>().unwrap().name, "named");
    assert!(resolver.resolve_by_name("missing").await.is_err());

    let typed = ResolverExt::resolve::<TestService>(&context).await.unwrap();
    assert_eq!(typed.name, "named");
}

#[tokio::test]
async fn test_errors_name_generic_instances() {
    let config = ContainerConfig::default().with_resolution_timeout_ms(None);
    let context = Context::with_config("app", config, EventHookManager::shared());
    context
        .register(
            ComponentRegistration::builder::<Shard<1>>()
                .depends_on::<Shard<2>>()
                .constructor(|_| Ok::<_, BoxError>(Shard::<1>)),
        )
        .unwrap();

    let error = context.mark_built().unwrap_err();
    assert!(error.to_string().contains("Shard<2>"), "{error}");
    assert!(!error.to_string().contains("integration_test::"));
}

trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;
}

struct EmailNotifier {
    initialized: Arc<AtomicUsize>,
    cleaned: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Component for EmailNotifier {
    async fn initialize(&self) -> Result<(), BoxError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        self.cleaned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }
}

struct Alerts {
    notifier: Arc<dyn Notifier>,
}
impl Component for Alerts {}

#[tokio::test]
async fn test_interface_binding_resolves_trait_object() {
    let initialized = Arc::new(AtomicUsize::new(0));
    let cleaned = Arc::new(AtomicUsize::new(0));
    let context = Context::new("notify");
    let (init, clean) = (initialized.clone(), cleaned.clone());
    context
        .register(
            ComponentRegistration::builder::<EmailNotifier>()
                .provides_as::<dyn Notifier>(|notifier| notifier as Arc<dyn Notifier>)
                .constructor(move |_| {
                    Ok::<_, BoxError>(EmailNotifier {
                        initialized: init.clone(),
                        cleaned: clean.clone(),
                    })
                }),
        )
        .unwrap();
    context
        .register(
            ComponentRegistration::builder::<Alerts>()
                .depends_on::<dyn Notifier>()
                .constructor(|deps| Ok::<_, BoxError>(Alerts { notifier: deps.get::<dyn Notifier>()? })),
        )
        .unwrap();
    let context = built(context);
    context.initialize().await.unwrap();

    let notifier = context.resolve::<dyn Notifier>().await.unwrap();
    let alerts = context.resolve::<Alerts>().await.unwrap();
    assert_eq!(notifier.channel(), "email");
    assert!(Arc::ptr_eq(&notifier, &alerts.notifier));
    assert!(context.is_registered_type::<dyn Notifier>());
    assert!(!context.is_registered_type::<EmailNotifier>());
    assert_eq!(initialized.load(Ordering::SeqCst), 1);

    context.shutdown().await.unwrap();
    assert_eq!(cleaned.load(Ordering::SeqCst), 1);
}

//! 多上下文构建与生命周期的集中集成测试

use async_trait::async_trait;
use di_abstractions::{
    ComponentRegistration, ContainerConfig, ContextDescriptor, EventHook, ImportSpec, RegistrationBuilder,
};
use di_common::{BoxError, Component, DiError, LifecycleState, TypeInfo};
use di_impl::{ContextGraphBuilder, ContextState, EventHookManager, MetadataStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

/// 记录钩子调用的测试组件
struct Hooked<const N: char> {
    journal: Journal,
    fail_init: bool,
}

#[async_trait]
impl<const N: char> Component for Hooked<N> {
    async fn initialize(&self) -> Result<(), BoxError> {
        self.journal.lock().push(format!("init {N}"));
        if self.fail_init {
            return Err(format!("{N} 初始化失败").into());
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        self.journal.lock().push(format!("cleanup {N}"));
        Ok(())
    }
}

type A = Hooked<'A'>;
type B = Hooked<'B'>;
type C = Hooked<'C'>;
type D = Hooked<'D'>;

fn hooked<const N: char>(
    builder: RegistrationBuilder<Hooked<N>>,
    journal: &Journal,
    fail_init: bool,
) -> ComponentRegistration {
    let journal = journal.clone();
    builder.constructor(move |_| {
        Ok::<_, BoxError>(Hooked::<N> {
            journal: journal.clone(),
            fail_init,
        })
    })
}

/// A <- B <- C <- D 的依赖链，`failing` 指定初始化失败的组件
fn chain_catalog(journal: &Journal, failing: Option<char>) -> Arc<MetadataStore> {
    let catalog = Arc::new(MetadataStore::new("catalog"));
    let fails = |name: char| failing == Some(name);

    catalog
        .register(hooked(ComponentRegistration::builder::<A>(), journal, fails('A')))
        .unwrap();
    catalog
        .register(hooked(
            ComponentRegistration::builder::<B>().depends_on::<A>(),
            journal,
            fails('B'),
        ))
        .unwrap();
    catalog
        .register(hooked(
            ComponentRegistration::builder::<C>().depends_on::<B>(),
            journal,
            fails('C'),
        ))
        .unwrap();
    catalog
        .register(hooked(
            ComponentRegistration::builder::<D>().depends_on::<C>(),
            journal,
            fails('D'),
        ))
        .unwrap();
    catalog
}

struct Infra;
impl Component for Infra {}

struct Customer {
    infra: Arc<Infra>,
}
impl Component for Customer {}

#[derive(Debug)]
struct Audit;
impl Component for Audit {}

struct Report {
    audit: Option<Arc<Audit>>,
}
impl Component for Report {}

fn customer_catalog() -> Arc<MetadataStore> {
    let catalog = Arc::new(MetadataStore::new("catalog"));
    catalog
        .register(ComponentRegistration::builder::<Infra>().constructor(|_| Ok::<_, BoxError>(Infra)))
        .unwrap();
    catalog
        .register(
            ComponentRegistration::builder::<Customer>()
                .depends_on::<Infra>()
                .constructor(|deps| Ok::<_, BoxError>(Customer { infra: deps.get::<Infra>()? })),
        )
        .unwrap();
    catalog
        .register(
            ComponentRegistration::builder::<Report>()
                .depends_on::<Audit>()
                .constructor(|deps| {
                    Ok::<_, BoxError>(Report {
                        audit: deps.get_optional::<Audit>(),
                    })
                }),
        )
        .unwrap();
    catalog
}

fn customer_descriptors() -> Vec<ContextDescriptor> {
    vec![
        ContextDescriptor::new("CustomerCtx")
            .provides::<Customer>()
            .import::<Infra>("InfraCtx"),
        ContextDescriptor::new("InfraCtx").provides::<Infra>().exports::<Infra>(),
    ]
}

#[tokio::test]
async fn test_build_order_follows_imports() -> anyhow::Result<()> {
    let builder = ContextGraphBuilder::new(customer_catalog());
    let mut descriptors = customer_descriptors();

    assert_eq!(builder.get_build_order(&descriptors)?, vec!["InfraCtx", "CustomerCtx"]);

    descriptors.reverse();
    assert_eq!(builder.get_build_order(&descriptors)?, vec!["InfraCtx", "CustomerCtx"]);
    Ok(())
}

#[tokio::test]
async fn test_cross_context_resolution() -> anyhow::Result<()> {
    let builder = ContextGraphBuilder::new(customer_catalog());
    let contexts = builder.build_contexts(&customer_descriptors()).await?;

    let infra_ctx = &contexts["InfraCtx"];
    let customer_ctx = &contexts["CustomerCtx"];
    assert_eq!(customer_ctx.state(), ContextState::Ready);

    let customer = customer_ctx.resolve::<Customer>().await?;
    let infra = infra_ctx.resolve::<Infra>().await?;
    assert!(Arc::ptr_eq(&customer.infra, &infra));

    // 导入的类型可以直接解析，得到来源上下文的同一实例
    let imported = customer_ctx.resolve::<Infra>().await?;
    assert!(Arc::ptr_eq(&imported, &infra));

    assert!(customer_ctx.is_registered(&TypeInfo::of::<Infra>()));
    assert_eq!(customer_ctx.get_registered_types(), vec![TypeInfo::of::<Customer>()]);
    assert_eq!(customer_ctx.imported_types(), vec![TypeInfo::of::<Infra>()]);
    assert!(!customer_ctx.can_export(&TypeInfo::of::<Customer>()));

    for context in [customer_ctx, infra_ctx] {
        context.shutdown().await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_context_cycle_is_rejected() {
    struct Left;
    struct Right;

    let descriptors = vec![
        ContextDescriptor::new("A").provides::<Left>().exports::<Left>().import::<Right>("B"),
        ContextDescriptor::new("B").provides::<Right>().exports::<Right>().import::<Left>("A"),
    ];
    let builder = ContextGraphBuilder::new(Arc::new(MetadataStore::new("catalog")));

    let error = builder.get_build_order(&descriptors).unwrap_err();
    assert_eq!(
        error,
        DiError::CircularContextDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()]
        }
    );

    let error = builder.build_contexts(&descriptors).await.unwrap_err();
    assert!(matches!(error, DiError::CircularContextDependency { .. }));
}

#[tokio::test]
async fn test_initialization_and_cleanup_order() -> anyhow::Result<()> {
    let journal = Journal::default();
    let catalog = chain_catalog(&journal, None);
    let descriptors = vec![ContextDescriptor::new("app")
        .provides::<C>()
        .provides::<A>()
        .provides::<B>()];

    let contexts = ContextGraphBuilder::new(catalog)
        .build_contexts(&descriptors)
        .await?;
    let app = &contexts["app"];

    let expected = vec![TypeInfo::of::<A>(), TypeInfo::of::<B>(), TypeInfo::of::<C>()];
    assert_eq!(app.get_initialization_order(), expected);
    assert_eq!(
        app.get_cleanup_order(),
        expected.iter().rev().copied().collect::<Vec<_>>()
    );
    assert_eq!(*journal.lock(), vec!["init A", "init B", "init C"]);

    app.shutdown().await?;
    assert_eq!(
        journal.lock()[3..].to_vec(),
        vec!["cleanup C", "cleanup B", "cleanup A"]
    );
    assert_eq!(app.state(), ContextState::ShutDown);
    Ok(())
}

#[tokio::test]
async fn test_initialization_failure_rolls_back_siblings() {
    let journal = Journal::default();
    let catalog = chain_catalog(&journal, Some('C'));
    let descriptors = vec![ContextDescriptor::new("app")
        .provides::<A>()
        .provides::<B>()
        .provides::<C>()
        .provides::<D>()];

    let error = ContextGraphBuilder::new(catalog)
        .build_contexts(&descriptors)
        .await
        .unwrap_err();

    match error {
        DiError::InitializationFailed {
            component,
            context,
            rollback,
            ..
        } => {
            assert_eq!(component, "Hooked<'C'>");
            assert_eq!(context, "app");
            assert_eq!(rollback.cleaned, vec!["Hooked<'B'>", "Hooked<'A'>"]);
            assert!(rollback.is_clean());
        }
        other => panic!("unexpected error: {other}"),
    }

    // D 排在 C 之后，不会收到任何钩子调用
    assert_eq!(
        *journal.lock(),
        vec!["init A", "init B", "init C", "cleanup B", "cleanup A"]
    );
}

#[tokio::test]
async fn test_failed_state_is_terminal() -> anyhow::Result<()> {
    let journal = Journal::default();
    let catalog = chain_catalog(&journal, Some('B'));
    let descriptors = vec![ContextDescriptor::new("app").provides::<A>().provides::<B>()];

    let config = ContainerConfig::default().with_initialize_on_build(false);
    let contexts = ContextGraphBuilder::new(catalog)
        .with_config(config)
        .build_contexts(&descriptors)
        .await?;
    let app = &contexts["app"];
    assert!(journal.lock().is_empty());

    assert!(app.initialize().await.is_err());
    assert_eq!(
        app.lifecycle_state(&TypeInfo::of::<B>()),
        Some(LifecycleState::FailedInit)
    );
    assert_eq!(
        app.lifecycle_state(&TypeInfo::of::<A>()),
        Some(LifecycleState::Destroyed)
    );
    Ok(())
}

#[tokio::test]
async fn test_optional_import_absent() -> anyhow::Result<()> {
    let descriptors = vec![
        ContextDescriptor::new("reports")
            .provides::<Report>()
            .import_optional::<Audit>("audit"),
    ];
    let builder = ContextGraphBuilder::new(customer_catalog());

    assert!(builder.validate_module_dependencies(&descriptors).is_empty());
    let contexts = builder.build_contexts(&descriptors).await?;
    let reports = &contexts["reports"];

    let report = reports.resolve::<Report>().await?;
    assert!(report.audit.is_none());
    assert!(reports.try_resolve::<Audit>().await?.is_none());

    let error = reports.resolve::<Audit>().await.unwrap_err();
    assert!(matches!(error, DiError::ContextImport { .. }));
    assert!(error.to_string().contains("audit"));
    Ok(())
}

#[tokio::test]
async fn test_required_import_without_export_fails() {
    let descriptors = vec![
        ContextDescriptor::new("InfraCtx").provides::<Infra>(),
        ContextDescriptor::new("CustomerCtx")
            .provides::<Customer>()
            .import::<Infra>("InfraCtx"),
    ];
    let builder = ContextGraphBuilder::new(customer_catalog());

    let diagnostics = builder.validate_module_dependencies(&descriptors);
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().any(|d| d.contains("CustomerCtx") && d.contains("Infra")));

    let error = builder.build_contexts(&descriptors).await.unwrap_err();
    assert_eq!(
        error,
        DiError::ContextImport {
            context: "CustomerCtx".into(),
            type_name: "Infra".into(),
            source_context: "InfraCtx".into(),
            reason: "来源上下文未导出该类型".into(),
        }
    );
}

#[tokio::test]
async fn test_validation_collects_every_problem() {
    struct Ghost;

    let descriptors = vec![
        ContextDescriptor::new("A").provides::<Ghost>().exports::<Customer>(),
        ContextDescriptor::new("A"),
        ContextDescriptor::new("B")
            .provides::<Infra>()
            .import::<Infra>("nowhere"),
    ];
    let builder = ContextGraphBuilder::new(customer_catalog());

    let diagnostics = builder.validate_module_dependencies(&descriptors);
    assert!(diagnostics.len() >= 4, "{diagnostics:?}");
    assert!(diagnostics.iter().any(|d| d.contains("Ghost")));
    assert!(diagnostics.iter().any(|d| d.contains("nowhere")));
}

#[tokio::test]
async fn test_hooks_observe_build() -> anyhow::Result<()> {
    let hooks = EventHookManager::shared();
    let created = Arc::new(AtomicUsize::new(0));
    let imports = Arc::new(Mutex::new(Vec::new()));

    let counter = created.clone();
    hooks.register(EventHook::ContextCreated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let seen = imports.clone();
    hooks.register(EventHook::ImportResolved, move |data| {
        seen.lock().push(data.context.clone().unwrap_or_default());
        Ok(())
    });
    // 失败的处理器不影响构建
    hooks.register(EventHook::ContextCreated, |_| Err("handler failed".into()));

    let contexts = ContextGraphBuilder::new(customer_catalog())
        .with_hooks(hooks.clone())
        .build_contexts(&customer_descriptors())
        .await?;

    assert_eq!(contexts.len(), 2);
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(*imports.lock(), vec!["CustomerCtx"]);
    assert!(Arc::ptr_eq(contexts["CustomerCtx"].hooks(), &hooks));
    Ok(())
}

mod billing {
    pub struct Config {
        pub currency: &'static str,
    }
    impl di_common::Component for Config {}
}

mod shipping {
    pub struct Config {
        pub carrier: &'static str,
    }
    impl di_common::Component for Config {}
}

#[tokio::test]
async fn test_imports_with_same_short_name() -> anyhow::Result<()> {
    let catalog = Arc::new(MetadataStore::new("catalog"));
    catalog.register(
        ComponentRegistration::builder::<billing::Config>()
            .constructor(|_| Ok::<_, BoxError>(billing::Config { currency: "EUR" })),
    )?;
    catalog.register(
        ComponentRegistration::builder::<shipping::Config>()
            .constructor(|_| Ok::<_, BoxError>(shipping::Config { carrier: "DHL" })),
    )?;

    let descriptors = vec![
        ContextDescriptor::new("billing")
            .provides::<billing::Config>()
            .exports::<billing::Config>(),
        ContextDescriptor::new("shipping")
            .provides::<shipping::Config>()
            .exports::<shipping::Config>(),
        ContextDescriptor::new("app")
            .import::<billing::Config>("billing")
            .with_import(ImportSpec::required::<shipping::Config>("shipping").with_alias("shipping_config")),
    ];
    let builder = ContextGraphBuilder::new(catalog);

    assert!(builder.validate_module_dependencies(&descriptors).is_empty());
    let contexts = builder.build_contexts(&descriptors).await?;
    let app = &contexts["app"];

    assert_eq!(app.resolve::<billing::Config>().await?.currency, "EUR");
    assert_eq!(app.resolve::<shipping::Config>().await?.carrier, "DHL");
    let by_alias = app.resolve_by_name("shipping_config").await?;
    assert!(by_alias.downcast::<shipping::Config>().is_some());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_alias_reported_by_validation_and_build() {
    let descriptors = vec![
        ContextDescriptor::new("InfraCtx")
            .provides::<Infra>()
            .exports::<Infra>()
            .provides::<Customer>()
            .exports::<Customer>(),
        ContextDescriptor::new("app")
            .with_import(ImportSpec::required::<Infra>("InfraCtx").with_alias("dep"))
            .with_import(ImportSpec::required::<Customer>("InfraCtx").with_alias("dep")),
    ];
    let builder = ContextGraphBuilder::new(customer_catalog());

    let diagnostics = builder.validate_module_dependencies(&descriptors);
    assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
    assert!(diagnostics[0].contains("dep"));

    let error = builder.build_contexts(&descriptors).await.unwrap_err();
    assert!(matches!(error, DiError::ContextImport { ref context, .. } if context == "app"));
}

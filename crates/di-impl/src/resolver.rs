//! 依赖解析
//!
//! 递归解析组件的构造依赖。依赖严格按声明顺序解析，解析链用于检测循环依赖。

use crate::broker::ImportBinding;
use crate::context::Context;
use di_abstractions::{ComponentInstance, ComponentRegistration, ResolveContext, ResolvedDependencies};
use di_common::{DiError, DiResult, TypeInfo};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// 在上下文中解析组件
///
/// 先查导入绑定，再查本地注册表。返回 `'static` future，
/// 以便单例构造可以脱离调用方独立运行。
pub(crate) fn resolve(
    context: Context,
    type_info: TypeInfo,
    mut chain: ResolveContext,
) -> BoxFuture<'static, DiResult<ComponentInstance>> {
    async move {
        if let Err(cycle) = chain.push_type(type_info) {
            return Err(DiError::CircularDependency {
                chain: cycle,
                context: context.name().to_string(),
            });
        }
        if chain.exceeds_max_depth() {
            return Err(DiError::ResolutionDepthExceeded {
                max_depth: chain.options.max_depth,
                chain: chain.render_chain(),
                context: context.name().to_string(),
            });
        }

        if let Some(binding) = context.import_binding(&type_info) {
            return resolve_import(&context, binding).await;
        }

        let registration = context.registry().lookup(&type_info)?;
        trace!("解析组件: {} ({}) 深度 {}", type_info, context.name(), chain.depth());

        let construct = {
            let context = context.clone();
            let registration = registration.clone();
            move || construct_instance(context, registration, chain).boxed()
        };
        context.scopes().create_instance(&registration, construct).await
    }
    .boxed()
}

async fn resolve_import(context: &Context, binding: ImportBinding) -> DiResult<ComponentInstance> {
    match binding {
        ImportBinding::Bound { spec, source } => {
            trace!("通过导入解析: {} <- {} ({})", context.name(), source.name(), spec.type_info);
            source.get_exported_instance(spec.type_info).await
        }
        ImportBinding::Absent { spec, reason } => Err(DiError::import_failed(
            context.name(),
            spec.type_info.short_name(),
            spec.source_context,
            reason,
        )),
    }
}

/// 按声明顺序解析依赖并调用工厂
async fn construct_instance(
    context: Context,
    registration: Arc<ComponentRegistration>,
    chain: ResolveContext,
) -> DiResult<ComponentInstance> {
    let type_info = registration.type_info();
    let mut slots = Vec::with_capacity(registration.dependencies().len());

    for dependency in registration.dependencies() {
        if context.is_absent_import(dependency) {
            debug!("可选导入缺失，按空依赖注入: {} -> {} ({})", type_info, dependency, context.name());
            slots.push((*dependency, None));
            continue;
        }
        let instance = resolve(context.clone(), *dependency, chain.clone()).await?;
        slots.push((*dependency, Some(instance)));
    }

    let dependencies = ResolvedDependencies::new(type_info, context.name(), slots);
    let instance = registration
        .construct(dependencies)
        .await
        .map_err(|e| DiError::ComponentCreationFailed {
            type_name: type_info.short_name(),
            context: context.name().to_string(),
            reason: e.to_string(),
        })?;

    debug!(
        "创建组件实例: {} ({}, 上下文: {})",
        type_info,
        registration.lifetime(),
        context.name()
    );
    Ok(instance)
}

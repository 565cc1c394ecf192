//! 导入/导出代理
//!
//! 把上下文声明中的导入绑定到已经构建完成的来源上下文。

use crate::context::Context;
use crate::hooks::EventHookManager;
use di_abstractions::{EventData, EventHook, ImportSpec};
use di_common::{DiError, DiResult};
use std::collections::HashMap;
use tracing::{info, warn};

/// 导入绑定
#[derive(Debug, Clone)]
pub enum ImportBinding {
    /// 已绑定到来源上下文的导出
    Bound { spec: ImportSpec, source: Context },
    /// 未满足的可选导入
    Absent { spec: ImportSpec, reason: String },
}

impl ImportBinding {
    /// 导入声明
    pub fn spec(&self) -> &ImportSpec {
        match self {
            Self::Bound { spec, .. } | Self::Absent { spec, .. } => spec,
        }
    }

    /// 是否已绑定
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound { .. })
    }

    /// 来源上下文
    pub fn source(&self) -> Option<&Context> {
        match self {
            Self::Bound { source, .. } => Some(source),
            Self::Absent { .. } => None,
        }
    }
}

/// 导入代理
pub struct ImportBroker<'a> {
    built: &'a HashMap<String, Context>,
    hooks: &'a EventHookManager,
}

impl<'a> ImportBroker<'a> {
    /// 基于已构建的上下文创建代理
    pub fn new(built: &'a HashMap<String, Context>, hooks: &'a EventHookManager) -> Self {
        Self { built, hooks }
    }

    /// 绑定单个导入
    ///
    /// 来源上下文不存在、尚未就绪或没有导出该类型时，必需导入返回
    /// [`DiError::ContextImport`]，可选导入得到缺失绑定。
    pub fn bind(&self, target: &str, spec: &ImportSpec) -> DiResult<ImportBinding> {
        match self.check_source(spec) {
            Ok(source) => {
                info!(
                    "绑定导入: {} <- {}::{}",
                    target, spec.source_context, spec.type_info
                );
                self.hooks.emit(
                    &EventData::new(EventHook::ImportResolved)
                        .with_context(target)
                        .with_component(spec.type_info.short_name())
                        .with_detail("source", spec.source_context.as_str()),
                );
                Ok(ImportBinding::Bound {
                    spec: spec.clone(),
                    source,
                })
            }
            Err(reason) => {
                self.hooks.emit(
                    &EventData::new(EventHook::ImportFailed)
                        .with_context(target)
                        .with_component(spec.type_info.short_name())
                        .with_detail("source", spec.source_context.as_str())
                        .with_detail("required", spec.required)
                        .with_detail("reason", reason.as_str()),
                );

                if spec.required {
                    return Err(DiError::import_failed(
                        target,
                        spec.type_info.short_name(),
                        spec.source_context.as_str(),
                        reason,
                    ));
                }

                warn!(
                    "可选导入未满足: {} <- {}::{}, 原因: {}",
                    target, spec.source_context, spec.type_info, reason
                );
                Ok(ImportBinding::Absent {
                    spec: spec.clone(),
                    reason,
                })
            }
        }
    }

    /// 按声明顺序绑定上下文的所有导入
    pub fn bind_all(&self, target: &Context, specs: &[ImportSpec]) -> DiResult<()> {
        for spec in specs {
            let binding = self.bind(target.name(), spec)?;
            target.add_import_binding(binding)?;
        }
        Ok(())
    }

    fn check_source(&self, spec: &ImportSpec) -> Result<Context, String> {
        let source = self
            .built
            .get(&spec.source_context)
            .ok_or_else(|| "来源上下文不存在或尚未构建".to_string())?;

        if !source.is_ready() {
            return Err(format!("来源上下文状态为 {}", source.state()));
        }
        if !source.can_export(&spec.type_info) {
            return Err("来源上下文未导出该类型".to_string());
        }
        Ok(source.clone())
    }
}

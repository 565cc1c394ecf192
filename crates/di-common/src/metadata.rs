//! 元数据定义
//!
//! 提供组件类型的标识信息

use serde::{Serialize, Serializer};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型信息
///
/// 组件在注册表、上下文和导入导出契约中的唯一标识。
/// 相等性和哈希只取决于 [`TypeId`]，名称仅用于日志和错误信息。
#[derive(Clone, Copy)]
pub struct TypeInfo {
    /// 类型ID
    id: TypeId,
    /// 完整类型名称（包含模块路径）
    type_name: &'static str,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 获取类型ID
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 获取完整类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 获取简短的类型名称
    ///
    /// 去掉所有模块路径（包括泛型参数内的），保留泛型参数本身，
    /// 例如 `app::Repo<app::db::Pg>` 渲染为 `Repo<Pg>`。
    pub fn short_name(&self) -> String {
        let mut rendered = String::with_capacity(self.type_name.len());
        let mut path = String::new();
        for c in self.type_name.chars() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                path.push(c);
                continue;
            }
            rendered.push_str(last_segment(&path));
            path.clear();
            rendered.push(c);
        }
        rendered.push_str(last_segment(&path));
        rendered
    }

    /// 是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInfo({})", self.type_name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl Serialize for TypeInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_name())
    }
}

/// 将类型列表渲染为简短名称列表
pub fn type_names(types: &[TypeInfo]) -> Vec<String> {
    types.iter().map(TypeInfo::short_name).collect()
}

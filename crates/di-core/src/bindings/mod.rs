//! 绑定策略定义
//!
//! 绑定是一个知道如何在给定解析上下文（和可选参数）下产出值的
//! 策略对象。绑定种类是封闭集合：Provider、Factory、Singleton、
//! Multiton、Instance、EagerSingleton、SetBinding、SubtypeDispatch，
//! 统一通过 [`DiBinding`] trait 对象分发。

mod scopes;
mod set;
mod standard;

pub use scopes::{
    new_registry, DiScope, MultiItemScopeRegistry, NoScope, RegistryKind, ScopeArg, ScopeCloseable,
    ScopeEntry, ScopeKey, ScopeRegistry, SingleItemScopeRegistry, WeakContextScope,
};
pub use set::{SetBinding, SubtypeDispatch};
pub use standard::{EagerSingleton, Factory, InstanceBinding, Multiton, Provider, Singleton};

use crate::container::DirectDi;
use crate::errors::{DiError, DiResult};
use crate::types::{DiKey, TypeToken};
use std::any::{type_name, Any};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 类型擦除后的值
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// 绑定产出的工厂函数：接受类型擦除的参数，返回类型擦除的值
pub type BindingFn = Box<dyn Fn(AnyValue) -> DiResult<AnyValue> + Send + Sync>;

/// 绑定策略 trait
///
/// 注册表是绑定实例的唯一所有者；绑定声明的
/// （上下文类型、参数类型、结果类型）必须与注册它的键一致。
pub trait DiBinding: Send + Sync {
    /// 绑定要求的上下文类型
    fn context_type(&self) -> TypeToken;

    /// 绑定接受的参数类型
    fn arg_type(&self) -> TypeToken;

    /// 绑定产出的结果类型
    fn created_type(&self) -> TypeToken;

    /// 绑定种类名称，用于诊断输出
    fn factory_name(&self) -> &'static str;

    /// 是否按请求结果类型的子类型参与兼容查找
    fn supports_sub_types(&self) -> bool {
        false
    }

    /// 获取本绑定在给定解析上下文中的工厂函数
    ///
    /// `di` 携带调用方上下文与在途解析链，绑定自身的创建函数
    /// 可以借助它执行嵌套解析。
    fn get_factory(&self, di: DirectDi, key: &DiKey) -> DiResult<BindingFn>;

    /// 以 `Any` 形式暴露自身，仅集合绑定需要（配置期追加元素）
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }

    /// 绑定描述，用于诊断输出
    fn description(&self) -> String {
        format!("{} ( {} )", self.factory_name(), self.created_type())
    }
}

/// 将类型擦除的值还原为具体类型
pub fn downcast_value<T: Send + Sync + 'static>(value: AnyValue) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::TypeMismatch {
            expected: type_name::<T>().to_owned(),
        })
}

/// 分配绑定实例标识，作用域缓存以此区分不同绑定的条目
pub(crate) fn new_binding_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// 单位参数值，供无参数绑定的工厂调用使用
pub(crate) fn unit_value() -> AnyValue {
    Arc::new(())
}

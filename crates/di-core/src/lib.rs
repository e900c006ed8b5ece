//! # DI Core
//!
//! 这个 crate 提供进程内依赖注入容器的核心实现：检索键与类型
//! 描述符、绑定策略、作用域缓存、绑定树查找以及类型化检索入口。
//!
//! ## 核心组件
//!
//! - [`Di`] - 构建完成的容器句柄
//! - [`DiBuilder`] - 配置期构建器
//! - [`DiModule`] - 可复用的绑定模块
//! - [`DirectDi`] - 携带上下文与解析链的检索视图
//! - [`DiKey`] / [`TypeToken`] - 检索键与类型描述符
//!
//! ## 设计原则
//!
//! - 配置期与解析期严格分离，容器构建完成后不可变
//! - 解析纯同步，不持有事件循环
//! - 错误以返回值形式交由调用方处置，库内部不做重试
//!
//! ## 基本使用
//!
//! ```rust
//! use di_core::Di;
//!
//! let di = Di::new(|builder| {
//!     builder.bind_constant("answer", 42_i32)?;
//!     builder.bind_singleton::<String>(None, |_| Ok("hello".to_owned()))
//! })
//! .unwrap();
//!
//! let answer: std::sync::Arc<i32> = di.instance(di_core::tag("answer")).unwrap();
//! assert_eq!(*answer, 42);
//! ```

pub mod bindings;
pub mod builder;
pub mod container;
pub mod di;
pub mod errors;
pub mod module;
pub mod types;

pub(crate) mod tree;

pub use bindings::{
    DiBinding, DiScope, MultiItemScopeRegistry, NoScope, ScopeCloseable, ScopeRegistry,
    SingleItemScopeRegistry, WeakContextScope,
};
pub use builder::{DiBuilder, OverrideMode, ReadyCallback};
pub use container::{Container, ContextTranslator, DirectDi, ExternalSource};
pub use di::{Di, FactoryFn, InitCallbacks, LazyInstance, ProviderFn};
pub use errors::{DiError, DiResult};
pub use module::DiModule;
pub use types::{tag, DiKey, Tag, TypeToken};

//! 标准绑定实现
//!
//! Provider / Factory 每次调用都执行创建函数，不做缓存；
//! Singleton / Multiton 通过作用域注册表缓存；Instance 包装既有值；
//! EagerSingleton 在容器构建完成时立即创建。

use super::scopes::{DiScope, NoScope, ScopeEntry, ScopeKey};
use super::{downcast_value, new_binding_id, AnyValue, BindingFn, DiBinding};
use crate::container::DirectDi;
use crate::errors::DiResult;
use crate::types::{DiKey, TypeToken};
use once_cell::sync::OnceCell;
use std::hash::Hash;
use std::sync::Arc;

type EntryCreator = Arc<dyn Fn(&DirectDi) -> DiResult<ScopeEntry> + Send + Sync>;
type ArgEntryCreator = Arc<dyn Fn(&DirectDi, AnyValue) -> DiResult<ScopeEntry> + Send + Sync>;
type ValueCreator = Arc<dyn Fn(&DirectDi) -> DiResult<AnyValue> + Send + Sync>;
type ArgToScopeArg =
    Arc<dyn Fn(&AnyValue) -> DiResult<Arc<dyn super::ScopeArg>> + Send + Sync>;

/// 提供者绑定：每次请求调用一次创建函数，产出新值
pub struct Provider {
    created: TypeToken,
    creator: ValueCreator,
}

impl Provider {
    /// 用具体类型的创建函数构造
    pub fn new<T: Send + Sync + 'static>(
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self::with_token(TypeToken::of::<T>(), creator)
    }

    /// 用显式结果描述符构造（参数化类型绑定使用）
    pub fn with_token<T: Send + Sync + 'static>(
        created: TypeToken,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            created,
            creator: Arc::new(move |di| creator(di).map(|v| Arc::new(v) as AnyValue)),
        }
    }
}

impl DiBinding for Provider {
    fn context_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn arg_type(&self) -> TypeToken {
        TypeToken::unit()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "provider"
    }

    fn get_factory(&self, di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let creator = self.creator.clone();
        Ok(Box::new(move |_arg| creator(&di)))
    }
}

/// 工厂绑定：接受参数，每次请求调用一次创建函数
pub struct Factory {
    arg: TypeToken,
    created: TypeToken,
    creator: ArgEntryCreator,
}

impl Factory {
    /// 用具体参数与结果类型的创建函数构造
    pub fn new<A: Send + Sync + 'static, T: Send + Sync + 'static>(
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            arg: TypeToken::of::<A>(),
            created: TypeToken::of::<T>(),
            creator: Arc::new(move |di, arg| {
                let arg = downcast_value::<A>(arg)?;
                creator(di, &arg).map(|v| ScopeEntry::plain(Arc::new(v)))
            }),
        }
    }
}

impl DiBinding for Factory {
    fn context_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn arg_type(&self) -> TypeToken {
        self.arg.clone()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "factory"
    }

    fn get_factory(&self, di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let creator = self.creator.clone();
        Ok(Box::new(move |arg| {
            creator(&di, arg).map(|entry| entry.value().clone())
        }))
    }
}

/// 单例绑定：每个作用域上下文创建一次并缓存
///
/// 默认作用域为 [`NoScope`]，即进程级单个缓存条目。
pub struct Singleton {
    id: u64,
    context: TypeToken,
    created: TypeToken,
    scope: Arc<dyn DiScope>,
    creator: EntryCreator,
}

impl Singleton {
    /// 无作用域单例
    pub fn new<T: Send + Sync + 'static>(
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self::build(
            TypeToken::Any,
            Arc::new(NoScope::new()),
            TypeToken::of::<T>(),
            Arc::new(move |di| creator(di).map(|v| ScopeEntry::plain(Arc::new(v)))),
        )
    }

    /// 绑定到给定作用域的单例，解析时要求提供 `C` 类型的上下文
    pub fn scoped<C: Send + Sync + 'static, T: Send + Sync + 'static>(
        scope: Arc<dyn DiScope>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self::build(
            TypeToken::of::<C>(),
            scope,
            TypeToken::of::<T>(),
            Arc::new(move |di| creator(di).map(|v| ScopeEntry::plain(Arc::new(v)))),
        )
    }

    /// 无作用域单例，值实现 [`super::ScopeCloseable`]，
    /// 从注册表移除时释放
    pub fn closeable<T: super::ScopeCloseable + Send + Sync + 'static>(
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self::build(
            TypeToken::Any,
            Arc::new(NoScope::new()),
            TypeToken::of::<T>(),
            Arc::new(move |di| creator(di).map(|v| ScopeEntry::closeable(Arc::new(v)))),
        )
    }

    /// 作用域单例的可释放变体
    pub fn scoped_closeable<
        C: Send + Sync + 'static,
        T: super::ScopeCloseable + Send + Sync + 'static,
    >(
        scope: Arc<dyn DiScope>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self::build(
            TypeToken::of::<C>(),
            scope,
            TypeToken::of::<T>(),
            Arc::new(move |di| creator(di).map(|v| ScopeEntry::closeable(Arc::new(v)))),
        )
    }

    fn build(
        context: TypeToken,
        scope: Arc<dyn DiScope>,
        created: TypeToken,
        creator: EntryCreator,
    ) -> Self {
        Self {
            id: new_binding_id(),
            context,
            created,
            scope,
            creator,
        }
    }
}

impl DiBinding for Singleton {
    fn context_type(&self) -> TypeToken {
        self.context.clone()
    }

    fn arg_type(&self) -> TypeToken {
        TypeToken::unit()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "singleton"
    }

    fn get_factory(&self, di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let registry = self.scope.get_registry(di.context_value())?;
        let creator = self.creator.clone();
        let scope_key = ScopeKey::no_arg(self.id);
        Ok(Box::new(move |_arg| {
            let mut create = || creator(&di);
            registry.get_or_create(scope_key.clone(), &mut create)
        }))
    }
}

/// 多例绑定：同一作用域上下文内按参数值各缓存一个实例
///
/// 参数以值相等语义充当缓存键，因此要求 `Eq + Hash`。
pub struct Multiton {
    id: u64,
    context: TypeToken,
    arg: TypeToken,
    created: TypeToken,
    scope: Arc<dyn DiScope>,
    creator: ArgEntryCreator,
    to_scope_arg: ArgToScopeArg,
}

impl Multiton {
    /// 无作用域多例
    pub fn new<A, T>(
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self
    where
        A: Eq + Hash + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self::build::<A>(
            TypeToken::Any,
            Arc::new(NoScope::new()),
            TypeToken::of::<T>(),
            Arc::new(move |di, arg| {
                let arg = downcast_value::<A>(arg)?;
                creator(di, &arg).map(|v| ScopeEntry::plain(Arc::new(v)))
            }),
        )
    }

    /// 绑定到给定作用域的多例
    pub fn scoped<C, A, T>(
        scope: Arc<dyn DiScope>,
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self
    where
        C: Send + Sync + 'static,
        A: Eq + Hash + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self::build::<A>(
            TypeToken::of::<C>(),
            scope,
            TypeToken::of::<T>(),
            Arc::new(move |di, arg| {
                let arg = downcast_value::<A>(arg)?;
                creator(di, &arg).map(|v| ScopeEntry::plain(Arc::new(v)))
            }),
        )
    }

    /// 无作用域多例的可释放变体
    pub fn closeable<A, T>(
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self
    where
        A: Eq + Hash + Send + Sync + 'static,
        T: super::ScopeCloseable + Send + Sync + 'static,
    {
        Self::build::<A>(
            TypeToken::Any,
            Arc::new(NoScope::new()),
            TypeToken::of::<T>(),
            Arc::new(move |di, arg| {
                let arg = downcast_value::<A>(arg)?;
                creator(di, &arg).map(|v| ScopeEntry::closeable(Arc::new(v)))
            }),
        )
    }

    fn build<A>(
        context: TypeToken,
        scope: Arc<dyn DiScope>,
        created: TypeToken,
        creator: ArgEntryCreator,
    ) -> Self
    where
        A: Eq + Hash + Send + Sync + 'static,
    {
        Self {
            id: new_binding_id(),
            context,
            arg: TypeToken::of::<A>(),
            created,
            scope,
            creator,
            to_scope_arg: Arc::new(|arg| {
                downcast_value::<A>(arg.clone()).map(|a| a as Arc<dyn super::ScopeArg>)
            }),
        }
    }
}

impl DiBinding for Multiton {
    fn context_type(&self) -> TypeToken {
        self.context.clone()
    }

    fn arg_type(&self) -> TypeToken {
        self.arg.clone()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "multiton"
    }

    fn get_factory(&self, di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let registry = self.scope.get_registry(di.context_value())?;
        let creator = self.creator.clone();
        let to_scope_arg = self.to_scope_arg.clone();
        let id = self.id;
        Ok(Box::new(move |arg| {
            let scope_arg = to_scope_arg(&arg)?;
            let scope_key = ScopeKey::with_arg(id, scope_arg);
            let mut create = || creator(&di, arg.clone());
            registry.get_or_create(scope_key, &mut create)
        }))
    }
}

/// 实例绑定：始终返回同一个既有值，不执行任何构造
pub struct InstanceBinding {
    created: TypeToken,
    value: AnyValue,
}

impl InstanceBinding {
    /// 包装一个既有值
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// 包装一个已共享的值
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            created: TypeToken::of::<T>(),
            value,
        }
    }
}

impl DiBinding for InstanceBinding {
    fn context_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn arg_type(&self) -> TypeToken {
        TypeToken::unit()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "instance"
    }

    fn get_factory(&self, _di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let value = self.value.clone();
        Ok(Box::new(move |_arg| Ok(value.clone())))
    }
}

/// 急切单例绑定：容器构建完成时立即创建，此后始终返回同一实例
pub struct EagerSingleton {
    created: TypeToken,
    cell: Arc<OnceCell<AnyValue>>,
    creator: ValueCreator,
}

impl EagerSingleton {
    /// 用具体类型的创建函数构造
    pub fn new<T: Send + Sync + 'static>(
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            created: TypeToken::of::<T>(),
            cell: Arc::new(OnceCell::new()),
            creator: Arc::new(move |di| creator(di).map(|v| Arc::new(v) as AnyValue)),
        }
    }
}

impl DiBinding for EagerSingleton {
    fn context_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn arg_type(&self) -> TypeToken {
        TypeToken::unit()
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "eager-singleton"
    }

    fn get_factory(&self, di: DirectDi, _key: &DiKey) -> DiResult<BindingFn> {
        let cell = self.cell.clone();
        let creator = self.creator.clone();
        Ok(Box::new(move |_arg| {
            cell.get_or_try_init(|| creator(&di)).cloned()
        }))
    }
}

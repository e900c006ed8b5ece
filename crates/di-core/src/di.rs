//! 公共入口与类型化检索
//!
//! [`Di`] 是构建完成的容器的只读句柄，可廉价克隆并跨线程共享。
//! 类型化检索方法把泛型参数翻译为检索键，经由 [`DirectDi`] 的
//! 解析引擎取得类型擦除的工厂，再还原为具体类型。

use crate::bindings::{downcast_value, unit_value, AnyValue};
use crate::builder::{DiBuilder, ReadyCallback};
use crate::container::{Container, DirectDi};
use crate::errors::DiResult;
use crate::types::{DiKey, Tag, TypeToken};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// 无参数的类型化工厂
pub type ProviderFn<T> = Arc<dyn Fn() -> DiResult<Arc<T>> + Send + Sync>;

/// 带参数的类型化工厂
pub type FactoryFn<A, T> = Arc<dyn Fn(A) -> DiResult<Arc<T>> + Send + Sync>;

/// 构建完成的依赖注入容器
#[derive(Clone)]
pub struct Di {
    container: Container,
}

/// 延迟的就绪回调集合
///
/// 由 [`Di::with_delayed_callbacks`] 返回，调用方决定执行时机；
/// 在执行之前急切单例尚未创建。
pub struct InitCallbacks {
    direct: DirectDi,
    callbacks: Vec<ReadyCallback>,
}

impl InitCallbacks {
    /// 依注册顺序执行全部就绪回调
    pub fn run(self) -> DiResult<()> {
        for callback in self.callbacks {
            callback(&self.direct)?;
        }
        Ok(())
    }
}

impl Di {
    /// 构建容器，覆盖必须显式声明
    ///
    /// 就绪回调（含急切单例的创建）在返回前执行完毕。
    pub fn new(f: impl FnOnce(&mut DiBuilder) -> DiResult<()>) -> DiResult<Self> {
        Self::build(false, f).and_then(|(di, callbacks)| {
            callbacks.run()?;
            Ok(di)
        })
    }

    /// 构建容器，允许静默覆盖
    pub fn new_silent_override(f: impl FnOnce(&mut DiBuilder) -> DiResult<()>) -> DiResult<Self> {
        Self::build(true, f).and_then(|(di, callbacks)| {
            callbacks.run()?;
            Ok(di)
        })
    }

    /// 构建容器但推迟就绪回调，由调用方决定执行时机
    pub fn with_delayed_callbacks(
        allow_silent_override: bool,
        f: impl FnOnce(&mut DiBuilder) -> DiResult<()>,
    ) -> DiResult<(Self, InitCallbacks)> {
        Self::build(allow_silent_override, f)
    }

    fn build(
        allow_silent_override: bool,
        f: impl FnOnce(&mut DiBuilder) -> DiResult<()>,
    ) -> DiResult<(Self, InitCallbacks)> {
        let mut builder = DiBuilder::new(allow_silent_override);
        f(&mut builder)?;
        let (container, callbacks) = builder.build();
        let di = Self { container };
        let init = InitCallbacks {
            direct: di.direct(),
            callbacks,
        };
        Ok((di, init))
    }

    /// 容器句柄
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 获得一次检索用的直接视图
    pub fn direct(&self) -> DirectDi {
        DirectDi::new(self.container.clone())
    }

    /// 检索单个实例
    pub fn instance<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> DiResult<Arc<T>> {
        self.direct().instance(tag)
    }

    /// 检索单个实例，携带工厂参数
    pub fn instance_with<A, T>(&self, tag: Option<Tag>, arg: A) -> DiResult<Arc<T>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.direct().instance_with(tag, arg)
    }

    /// 检索提供者函数
    pub fn provider<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> DiResult<ProviderFn<T>> {
        self.direct().provider(tag)
    }

    /// 检索工厂函数
    pub fn factory<A, T>(&self, tag: Option<Tag>) -> DiResult<FactoryFn<A, T>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.direct().factory(tag)
    }

    /// 检索单个实例，未命中返回 `None`
    pub fn instance_or_none<T: Send + Sync + 'static>(
        &self,
        tag: Option<Tag>,
    ) -> DiResult<Option<Arc<T>>> {
        self.direct().instance_or_none(tag)
    }

    /// 纯存在性检查
    pub fn has_provider<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> bool {
        self.direct().has_provider::<T>(tag)
    }

    /// 惰性检索句柄，首次取值时解析并缓存
    pub fn lazy_instance<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> LazyInstance<T> {
        self.direct().lazy_instance(tag)
    }
}

impl DirectDi {
    fn key_for<A: 'static, T: 'static>(&self, tag: Option<Tag>) -> DiKey {
        DiKey::new(
            self.context_type().clone(),
            TypeToken::of::<A>(),
            TypeToken::of::<T>(),
            tag,
        )
    }

    /// 检索单个实例
    pub fn instance<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> DiResult<Arc<T>> {
        let factory = self.factory_for(&self.key_for::<(), T>(tag))?;
        downcast_value(factory(unit_value())?)
    }

    /// 检索单个实例，未命中返回 `None`
    ///
    /// 依赖循环与歧义错误不在豁免之列，仍然向上传播。
    pub fn instance_or_none<T: Send + Sync + 'static>(
        &self,
        tag: Option<Tag>,
    ) -> DiResult<Option<Arc<T>>> {
        match self.factory_for_or_none(&self.key_for::<(), T>(tag))? {
            Some(factory) => downcast_value(factory(unit_value())?).map(Some),
            None => Ok(None),
        }
    }

    /// 检索单个实例，携带工厂参数
    pub fn instance_with<A, T>(&self, tag: Option<Tag>, arg: A) -> DiResult<Arc<T>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let factory = self.factory_for(&self.key_for::<A, T>(tag))?;
        downcast_value(factory(Arc::new(arg) as AnyValue)?)
    }

    /// 用显式结果描述符检索实例
    ///
    /// 用于以手工描述符（参数化类型）注册的绑定；`T` 是绑定实际
    /// 产出的具体类型。
    pub fn instance_of<T: Send + Sync + 'static>(
        &self,
        result: TypeToken,
        tag: Option<Tag>,
    ) -> DiResult<Arc<T>> {
        let key = DiKey::new(
            self.context_type().clone(),
            TypeToken::unit(),
            result,
            tag,
        );
        let factory = self.factory_for(&key)?;
        downcast_value(factory(unit_value())?)
    }

    /// 检索提供者函数，每次调用都经过所属绑定的策略
    pub fn provider<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> DiResult<ProviderFn<T>> {
        let factory = self.factory_for(&self.key_for::<(), T>(tag))?;
        Ok(Arc::new(move || downcast_value(factory(unit_value())?)))
    }

    /// 检索提供者函数，未命中返回 `None`
    pub fn provider_or_none<T: Send + Sync + 'static>(
        &self,
        tag: Option<Tag>,
    ) -> DiResult<Option<ProviderFn<T>>> {
        Ok(self
            .factory_for_or_none(&self.key_for::<(), T>(tag))?
            .map(|factory| {
                Arc::new(move || downcast_value(factory(unit_value())?)) as ProviderFn<T>
            }))
    }

    /// 检索工厂函数
    pub fn factory<A, T>(&self, tag: Option<Tag>) -> DiResult<FactoryFn<A, T>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let factory = self.factory_for(&self.key_for::<A, T>(tag))?;
        Ok(Arc::new(move |arg: A| {
            downcast_value(factory(Arc::new(arg) as AnyValue)?)
        }))
    }

    /// 检索工厂函数，未命中返回 `None`
    pub fn factory_or_none<A, T>(&self, tag: Option<Tag>) -> DiResult<Option<FactoryFn<A, T>>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Ok(self
            .factory_for_or_none(&self.key_for::<A, T>(tag))?
            .map(|factory| {
                Arc::new(move |arg: A| downcast_value(factory(Arc::new(arg) as AnyValue)?))
                    as FactoryFn<A, T>
            }))
    }

    /// 检索全部匹配绑定的实例
    pub fn all_instances<T: Send + Sync + 'static>(
        &self,
        tag: Option<Tag>,
    ) -> DiResult<Vec<Arc<T>>> {
        self.all_factories_for(&self.key_for::<(), T>(tag))?
            .into_iter()
            .map(|factory| downcast_value(factory(unit_value())?))
            .collect()
    }

    /// 检索全部匹配绑定的提供者函数
    pub fn all_providers<T: Send + Sync + 'static>(
        &self,
        tag: Option<Tag>,
    ) -> DiResult<Vec<ProviderFn<T>>> {
        Ok(self
            .all_factories_for(&self.key_for::<(), T>(tag))?
            .into_iter()
            .map(|factory| {
                Arc::new(move || downcast_value(factory(unit_value())?)) as ProviderFn<T>
            })
            .collect())
    }

    /// 检索全部匹配绑定的工厂函数
    pub fn all_factories<A, T>(&self, tag: Option<Tag>) -> DiResult<Vec<FactoryFn<A, T>>>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Ok(self
            .all_factories_for(&self.key_for::<A, T>(tag))?
            .into_iter()
            .map(|factory| {
                Arc::new(move |arg: A| downcast_value(factory(Arc::new(arg) as AnyValue)?))
                    as FactoryFn<A, T>
            })
            .collect())
    }

    /// 纯存在性检查：是否存在 `(A) -> T` 形状的绑定
    ///
    /// 不触发任何构造，惰性绑定不会因此实例化。
    pub fn has_factory<A, T>(&self, tag: Option<Tag>) -> bool
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.has_binding(&self.key_for::<A, T>(tag))
    }

    /// 纯存在性检查：是否存在无参数产出 `T` 的绑定
    pub fn has_provider<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> bool {
        self.has_binding(&self.key_for::<(), T>(tag))
    }

    /// 惰性检索句柄
    pub fn lazy_instance<T: Send + Sync + 'static>(&self, tag: Option<Tag>) -> LazyInstance<T> {
        LazyInstance {
            di: self.clone(),
            key: self.key_for::<(), T>(tag),
            cell: OnceCell::new(),
        }
    }
}

/// 惰性实例句柄
///
/// 首次 [`LazyInstance::get`] 时解析并缓存，之后始终返回同一实例；
/// 解析失败不缓存，后续调用会重试。
pub struct LazyInstance<T> {
    di: DirectDi,
    key: DiKey,
    cell: OnceCell<Arc<T>>,
}

impl<T: Send + Sync + 'static> LazyInstance<T> {
    /// 取值，必要时先解析
    pub fn get(&self) -> DiResult<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                let factory = self.di.factory_for(&self.key)?;
                downcast_value(factory(unit_value())?)
            })
            .cloned()
    }

    /// 是否已经解析过
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

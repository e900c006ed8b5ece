//! 配置期构建器
//!
//! 构建器只在配置期存在，收集绑定定义、上下文转换器、外部源与
//! 就绪回调；`build` 之后产出的容器不可再变。覆盖合法性在注册时
//! 立即校验，非法覆盖在配置期失败而不是解析期。

use crate::bindings::{
    DiBinding, DiScope, EagerSingleton, Factory, InstanceBinding, Multiton, Provider,
    ScopeCloseable, SetBinding, Singleton,
};
use crate::container::{Container, ContextTranslator, DirectDi, ExternalSource};
use crate::di::Di;
use crate::errors::{DiError, DiResult};
use crate::module::DiModule;
use crate::tree::{BindingTree, Definition};
use crate::types::{DiKey, Tag, TypeToken};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

/// 容器就绪回调，在首次构建完成后、任何检索发生前执行
pub type ReadyCallback = Box<dyn FnOnce(&DirectDi) -> DiResult<()> + Send>;

/// 覆盖模式
///
/// 决定注册一个已存在的键时的处置方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    /// 允许覆盖，且无需显式声明
    AllowSilent,
    /// 允许覆盖，但每条覆盖绑定必须显式声明
    AllowExplicit,
    /// 禁止一切覆盖
    Forbid,
}

impl OverrideMode {
    fn is_allowed(self) -> bool {
        !matches!(self, Self::Forbid)
    }

    /// 归一化绑定的覆盖声明
    ///
    /// 返回 `Some(true)` 表示必须覆盖既有绑定，`Some(false)` 表示
    /// 必须不覆盖，`None` 表示两者皆可。
    fn must(self, declared: Option<bool>) -> DiResult<Option<bool>> {
        match self {
            Self::AllowSilent => Ok(declared),
            Self::AllowExplicit => Ok(Some(declared.unwrap_or(false))),
            Self::Forbid => {
                if declared == Some(true) {
                    Err(DiError::illegal_state("当前配置域禁止覆盖绑定"))
                } else {
                    Ok(Some(false))
                }
            }
        }
    }
}

/// 依赖注入构建器
pub struct DiBuilder {
    bindings: HashMap<DiKey, Vec<Definition>>,
    callbacks: Vec<ReadyCallback>,
    translators: Vec<ContextTranslator>,
    external_source: Option<Arc<dyn ExternalSource>>,
    imported: HashSet<String>,
    silently_overridable: HashSet<DiKey>,
    module_name: Option<String>,
    mode: OverrideMode,
}

impl DiBuilder {
    pub(crate) fn new(allow_silent_override: bool) -> Self {
        Self {
            bindings: HashMap::new(),
            callbacks: Vec::new(),
            translators: Vec::new(),
            external_source: None,
            imported: HashSet::new(),
            silently_overridable: HashSet::new(),
            module_name: None,
            mode: if allow_silent_override {
                OverrideMode::AllowSilent
            } else {
                OverrideMode::AllowExplicit
            },
        }
    }

    /// 注册一条绑定，键由绑定声明的类型三元组与标签构成
    pub fn bind(
        &mut self,
        tag: Option<Tag>,
        overrides: Option<bool>,
        binding: impl DiBinding + 'static,
    ) -> DiResult<()> {
        let key = DiKey::new(
            binding.context_type(),
            binding.arg_type(),
            binding.created_type(),
            tag,
        );
        self.bind_key(key, Arc::new(binding), overrides)
    }

    /// 用显式键注册一条绑定
    ///
    /// 覆盖时新定义压入定义栈顶，成为该键当前生效的定义。
    pub fn bind_key(
        &mut self,
        key: DiKey,
        binding: Arc<dyn DiBinding>,
        overrides: Option<bool>,
    ) -> DiResult<()> {
        self.check_overrides(&key, overrides)?;
        trace!(key = %key, factory = binding.factory_name(), "注册绑定");
        let definition = Definition {
            binding,
            from_module: self.module_name.clone(),
        };
        self.bindings.entry(key).or_default().insert(0, definition);
        Ok(())
    }

    fn check_overrides(&self, key: &DiKey, overrides: Option<bool>) -> DiResult<()> {
        let mode = if self.silently_overridable.contains(key) {
            OverrideMode::AllowSilent
        } else {
            self.mode
        };
        let must = mode.must(overrides).map_err(|e| self.conflict(key, e))?;
        let exists = self.bindings.contains_key(key);
        match must {
            Some(true) if !exists => Err(self.conflict(
                key,
                DiError::illegal_state("绑定声明了覆盖, 但不存在可覆盖的既有绑定"),
            )),
            Some(false) if exists => Err(self.conflict(
                key,
                DiError::illegal_state("键已存在绑定, 覆盖必须显式声明"),
            )),
            _ => Ok(()),
        }
    }

    fn conflict(&self, key: &DiKey, cause: DiError) -> DiError {
        DiError::OverrideConflict {
            key: key.to_string(),
            module: self.module_name.clone().unwrap_or_else(|| "<根配置>".to_owned()),
            message: cause.to_string(),
        }
    }

    /// 绑定提供者：每次检索调用一次创建函数
    pub fn bind_provider<T: Send + Sync + 'static>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()> {
        self.bind(tag, None, Provider::new(creator))
    }

    /// 绑定工厂：每次检索携带参数调用一次创建函数
    pub fn bind_factory<A, T>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.bind(tag, None, Factory::new(creator))
    }

    /// 绑定单例
    pub fn bind_singleton<T: Send + Sync + 'static>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()> {
        self.bind(tag, None, Singleton::new(creator))
    }

    /// 绑定作用域单例，检索时要求附加 `C` 类型上下文
    pub fn bind_scoped_singleton<C, T>(
        &mut self,
        tag: Option<Tag>,
        scope: Arc<dyn DiScope>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()>
    where
        C: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.bind(tag, None, Singleton::scoped::<C, T>(scope, creator))
    }

    /// 绑定可释放单例，条目被移除或清空时调用其 `close`
    pub fn bind_closeable_singleton<T>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()>
    where
        T: ScopeCloseable + Send + Sync + 'static,
    {
        self.bind(tag, None, Singleton::closeable(creator))
    }

    /// 绑定多例：同一上下文内按参数值各缓存一个实例
    pub fn bind_multiton<A, T>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi, &A) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()>
    where
        A: Eq + Hash + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.bind(tag, None, Multiton::new(creator))
    }

    /// 绑定既有实例
    pub fn bind_instance<T: Send + Sync + 'static>(
        &mut self,
        tag: Option<Tag>,
        value: T,
    ) -> DiResult<()> {
        self.bind(tag, None, InstanceBinding::new(value))
    }

    /// 绑定常量，与实例绑定等价但标签必填
    pub fn bind_constant<T: Send + Sync + 'static>(
        &mut self,
        tag: impl Into<Tag>,
        value: T,
    ) -> DiResult<()> {
        self.bind(Some(tag.into()), None, InstanceBinding::new(value))
    }

    /// 绑定急切单例，容器构建完成时立即创建
    pub fn bind_eager_singleton<T: Send + Sync + 'static>(
        &mut self,
        tag: Option<Tag>,
        creator: impl Fn(&DirectDi) -> DiResult<T> + Send + Sync + 'static,
    ) -> DiResult<()> {
        let binding = EagerSingleton::new::<T>(creator);
        let key = DiKey::new(
            binding.context_type(),
            binding.arg_type(),
            binding.created_type(),
            tag.clone(),
        );
        self.bind(tag, None, binding)?;
        self.on_ready(move |di| {
            let factory = di.factory_for(&key)?;
            factory(crate::bindings::unit_value()).map(|_| ())
        });
        Ok(())
    }

    /// 注册空集合绑定，元素随后通过 [`DiBuilder::in_set`] 追加
    pub fn bind_set<A, T>(&mut self, tag: Option<Tag>) -> DiResult<()>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.bind(tag, None, SetBinding::new::<A, T>())
    }

    /// 向既有集合绑定追加一个元素绑定
    pub fn in_set<A, T>(
        &mut self,
        tag: Option<Tag>,
        element: Arc<dyn DiBinding>,
    ) -> DiResult<()>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = DiKey::new(
            TypeToken::Any,
            TypeToken::of::<A>(),
            TypeToken::of::<Vec<Arc<T>>>(),
            tag,
        );
        let set = self
            .bindings
            .get(&key)
            .and_then(|defs| defs.first())
            .and_then(|def| def.binding.as_any())
            .and_then(|any| any.downcast_ref::<SetBinding>())
            .ok_or_else(|| {
                DiError::illegal_state(format!("键 {key} 上不存在可追加元素的集合绑定"))
            })?;
        set.add(element)
    }

    /// 注册容器就绪回调
    pub fn on_ready(
        &mut self,
        callback: impl FnOnce(&DirectDi) -> DiResult<()> + Send + 'static,
    ) {
        self.callbacks.push(Box::new(callback));
    }

    /// 导入模块
    ///
    /// 同名模块的重复导入是无操作，不报错也不重复执行模块体。
    /// 模块体内禁止覆盖既有绑定，除非以 `allow_override` 导入。
    pub fn import(&mut self, module: &DiModule) -> DiResult<()> {
        self.import_with(module, false)
    }

    /// 导入模块并控制其覆盖权限
    pub fn import_with(&mut self, module: &DiModule, allow_override: bool) -> DiResult<()> {
        if !self.imported.insert(module.name().to_owned()) {
            debug!(module = module.name(), "模块已导入, 跳过");
            return Ok(());
        }
        debug!(module = module.name(), "导入模块");
        let saved_mode = self.mode;
        let saved_name = self.module_name.take();
        self.mode = if !self.mode.is_allowed() || !allow_override {
            OverrideMode::Forbid
        } else if module.allow_silent_override() {
            OverrideMode::AllowSilent
        } else {
            OverrideMode::AllowExplicit
        };
        self.module_name = Some(module.name().to_owned());
        let result = module.apply(self);
        self.mode = saved_mode;
        self.module_name = saved_name;
        result
    }

    /// 继承另一个容器的全部绑定
    ///
    /// `allow_override` 为真时，继承来的键可被本配置域静默覆盖。
    pub fn extend(&mut self, di: &Di, allow_override: bool) {
        let tree = &di.container().tree;
        for (key, defs) in tree.bindings() {
            let target = self.bindings.entry(key.clone()).or_default();
            target.extend(defs.iter().cloned());
            if allow_override {
                self.silently_overridable.insert(key.clone());
            }
        }
        self.translators.extend(tree.translators().iter().cloned());
        if self.external_source.is_none() {
            self.external_source = tree.external_source().cloned();
        }
    }

    /// 设置外部源回退钩子，后设置者生效
    pub fn external_source(&mut self, source: impl ExternalSource + 'static) {
        self.external_source = Some(Arc::new(source));
    }

    /// 注册上下文转换器
    pub fn register_context_translator(&mut self, translator: ContextTranslator) {
        self.translators.push(translator);
    }

    pub(crate) fn build(self) -> (Container, Vec<ReadyCallback>) {
        debug!(bindings = self.bindings.len(), "容器构建完成");
        let tree = BindingTree::new(self.bindings, self.external_source, self.translators);
        (Container::new(tree), self.callbacks)
    }
}

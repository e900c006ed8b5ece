//! 容器与解析引擎
//!
//! 解析顺序：精确/兼容查找 → 上下文转换回退 → 外部源回退 →
//! 未命中错误。每次查找携带调用链私有的在途解析链，键在链上
//! 重复出现即在任何递归构造发生之前报告依赖循环。

use crate::bindings::{AnyValue, BindingFn, DiBinding};
use crate::errors::{DiError, DiResult};
use crate::tree::BindingTree;
use crate::types::{DiKey, TypeToken};
use std::sync::Arc;

/// 外部源回退钩子
///
/// 仅在常规查找（含上下文转换）完全未命中后调用，返回 `None`
/// 保持标准的未命中错误。
pub trait ExternalSource: Send + Sync {
    /// 为注册表不认识的键提供工厂
    fn get_factory(&self, di: &DirectDi, key: &DiKey) -> Option<BindingFn>;
}

type TranslateFn = Arc<dyn Fn(&AnyValue) -> DiResult<Option<AnyValue>> + Send + Sync>;

/// 上下文转换器
///
/// 把调用方提供的 `F` 类型上下文值转换为候选绑定要求的 `T` 类型，
/// 使上下文类型不同的绑定也能命中。转换只做单跳，不做链式搜索。
#[derive(Clone)]
pub struct ContextTranslator {
    from: TypeToken,
    to: TypeToken,
    translate: TranslateFn,
}

impl ContextTranslator {
    /// 构造转换器，`f` 返回 `None` 表示此上下文值无法转换
    pub fn new<F, T>(f: impl Fn(&F) -> DiResult<Option<Arc<T>>> + Send + Sync + 'static) -> Self
    where
        F: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self {
            from: TypeToken::of::<F>(),
            to: TypeToken::of::<T>(),
            translate: Arc::new(move |value| {
                let from = crate::bindings::downcast_value::<F>(value.clone())?;
                Ok(f(&from)?.map(|to| to as AnyValue))
            }),
        }
    }

    pub(crate) fn from_type(&self) -> &TypeToken {
        &self.from
    }

    pub(crate) fn to_type(&self) -> &TypeToken {
        &self.to
    }

    pub(crate) fn translate(&self, value: &AnyValue) -> DiResult<Option<AnyValue>> {
        (self.translate)(value)
    }
}

/// 在途解析链节点
///
/// 每次进入一个绑定的工厂就为其嵌套解析构造一个子节点；沿父链
/// 回溯即可在递归构造开始前发现重复的键。
struct Node {
    key: DiKey,
    parent: Option<Arc<Node>>,
}

impl Node {
    fn contains(&self, key: &DiKey) -> bool {
        self.key == *key || self.parent.as_ref().is_some_and(|p| p.contains(key))
    }

    /// 从最外层到最内层的键路径
    fn path(&self) -> Vec<String> {
        let mut path = self
            .parent
            .as_ref()
            .map(|p| p.path())
            .unwrap_or_default();
        path.push(self.key.to_string());
        path
    }
}

/// 绑定解析容器
///
/// 构建完成后不可变，可廉价克隆共享。
#[derive(Clone)]
pub struct Container {
    pub(crate) tree: Arc<BindingTree>,
}

impl Container {
    pub(crate) fn new(tree: BindingTree) -> Self {
        Self {
            tree: Arc::new(tree),
        }
    }
}

/// 一次解析的视图：容器引用、调用方上下文与在途解析链
///
/// 解析链是调用链私有的，并发的无关解析不会互相误报循环。
#[derive(Clone)]
pub struct DirectDi {
    container: Container,
    context_type: TypeToken,
    context: Option<AnyValue>,
    node: Option<Arc<Node>>,
}

impl DirectDi {
    pub(crate) fn new(container: Container) -> Self {
        Self {
            container,
            context_type: TypeToken::Any,
            context: None,
            node: None,
        }
    }

    /// 所属容器
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 附加类型化的上下文值，后续检索键携带该上下文类型
    pub fn on<C: Send + Sync + 'static>(&self, context: Arc<C>) -> Self {
        Self {
            container: self.container.clone(),
            context_type: TypeToken::of::<C>(),
            context: Some(context),
            node: self.node.clone(),
        }
    }

    /// 当前上下文值（类型擦除形式），作用域据此取得注册表
    pub fn context_value(&self) -> Option<&AnyValue> {
        self.context.as_ref()
    }

    /// 当前上下文值的类型化访问，供绑定的创建函数使用
    pub fn context<C: Send + Sync + 'static>(&self) -> DiResult<Arc<C>> {
        let value = self
            .context
            .as_ref()
            .ok_or_else(|| DiError::illegal_state("当前解析没有附加上下文值"))?;
        crate::bindings::downcast_value::<C>(value.clone())
    }

    /// 当前上下文类型
    pub fn context_type(&self) -> &TypeToken {
        &self.context_type
    }

    /// 解析键对应的工厂函数
    pub fn factory_for(&self, key: &DiKey) -> DiResult<BindingFn> {
        if let Some((real_key, definition)) = self.container.tree.find(key)? {
            self.check_node(key)?;
            let child = self.child_for(key);
            // 子类型分发绑定按请求的具体描述符取工厂, 其余绑定用注册键
            let effective = if definition.binding.supports_sub_types() {
                key
            } else {
                &real_key
            };
            return definition.binding.get_factory(child, effective);
        }

        if let Some(factory) = self.translated_factory(key)? {
            return Ok(factory);
        }

        if let Some(source) = self.container.tree.external_source() {
            let probe = self.child_for(key);
            if let Some(factory) = source.get_factory(&probe, key) {
                self.check_node(key)?;
                return Ok(factory);
            }
        }

        Err(self.not_found(key))
    }

    /// 上下文转换回退：单跳转换后重试查找
    fn translated_factory(&self, key: &DiKey) -> DiResult<Option<BindingFn>> {
        if key.context_type == TypeToken::Any {
            return Ok(None);
        }
        for translator in self.container.tree.translators() {
            if !translator.from_type().is_assignable_from(&key.context_type) {
                continue;
            }
            let translated_key = key.with_context(translator.to_type().clone());
            let Some((real_key, definition)) = self.container.tree.find(&translated_key)? else {
                continue;
            };
            let context = self.context.as_ref().ok_or_else(|| {
                DiError::illegal_state("上下文转换回退需要调用方提供上下文值")
            })?;
            let Some(translated) = translator.translate(context)? else {
                continue;
            };
            self.check_node(key)?;
            let mut child = self.child_for(key);
            child.context_type = translator.to_type().clone();
            child.context = Some(translated);
            let effective = if definition.binding.supports_sub_types() {
                &translated_key
            } else {
                &real_key
            };
            return definition.binding.get_factory(child, effective).map(Some);
        }
        Ok(None)
    }

    /// `factory_for` 的宽松变体：仅未命中转换为 `None`
    pub fn factory_for_or_none(&self, key: &DiKey) -> DiResult<Option<BindingFn>> {
        match self.factory_for(key) {
            Ok(factory) => Ok(Some(factory)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 解析全部匹配绑定的工厂函数
    pub fn all_factories_for(&self, key: &DiKey) -> DiResult<Vec<BindingFn>> {
        self.container
            .tree
            .find_all(key)
            .into_iter()
            .map(|(real_key, definition)| {
                self.check_node(key)?;
                let effective = if definition.binding.supports_sub_types() {
                    key
                } else {
                    &real_key
                };
                definition.binding.get_factory(self.child_for(key), effective)
            })
            .collect()
    }

    /// 纯存在性检查，不触发任何构造
    pub fn has_binding(&self, key: &DiKey) -> bool {
        !self.container.tree.find_all(key).is_empty()
    }

    fn check_node(&self, key: &DiKey) -> DiResult<()> {
        let Some(node) = &self.node else {
            return Ok(());
        };
        if !node.contains(key) {
            return Ok(());
        }
        let mut chain = node.path();
        chain.push(key.to_string());
        Err(DiError::DependencyLoop {
            chain: chain.join("\n  ╚> "),
        })
    }

    fn child_for(&self, key: &DiKey) -> Self {
        Self {
            container: self.container.clone(),
            context_type: self.context_type.clone(),
            context: self.context.clone(),
            node: Some(Arc::new(Node {
                key: key.clone(),
                parent: self.node.clone(),
            })),
        }
    }

    fn not_found(&self, key: &DiKey) -> DiError {
        DiError::NotFound {
            key: key.to_string(),
            available: self
                .container
                .tree
                .description_for_result(&key.result_type),
        }
    }
}

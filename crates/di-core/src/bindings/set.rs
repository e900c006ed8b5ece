//! 集合绑定与子类型分发绑定

use super::{downcast_value, AnyValue, BindingFn, DiBinding};
use crate::container::DirectDi;
use crate::errors::{DiError, DiResult};
use crate::types::{DiKey, TypeToken};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Collector = Arc<dyn Fn(Vec<AnyValue>) -> DiResult<AnyValue> + Send + Sync>;
type DispatchBlock = Arc<dyn Fn(&TypeToken) -> DiResult<Arc<dyn DiBinding>> + Send + Sync>;

/// 集合绑定：把多个元素绑定聚合为 `Vec<Arc<T>>`
///
/// 元素在配置期通过 [`SetBinding::add`] 追加（构建完成后元素列表
/// 不再变化）；解析时逐个调用元素绑定的工厂并收集结果。
pub struct SetBinding {
    arg: TypeToken,
    element: TypeToken,
    created: TypeToken,
    set: RwLock<Vec<Arc<dyn DiBinding>>>,
    collect: Collector,
}

impl SetBinding {
    /// 创建空的集合绑定
    ///
    /// `A` 为元素工厂共同的参数类型（提供者风格的集合用 `()`），
    /// `T` 为元素类型，聚合结果类型为 `Vec<Arc<T>>`。
    pub fn new<A: Send + Sync + 'static, T: Send + Sync + 'static>() -> Self {
        Self {
            arg: TypeToken::of::<A>(),
            element: TypeToken::of::<T>(),
            created: TypeToken::of::<Vec<Arc<T>>>(),
            set: RwLock::new(Vec::new()),
            collect: Arc::new(|values| {
                let collected = values
                    .into_iter()
                    .map(downcast_value::<T>)
                    .collect::<DiResult<Vec<_>>>()?;
                Ok(Arc::new(collected) as AnyValue)
            }),
        }
    }

    /// 集合元素的类型描述符
    pub fn element_type(&self) -> &TypeToken {
        &self.element
    }

    /// 追加一个元素绑定，仅允许在配置期调用
    pub fn add(&self, binding: Arc<dyn DiBinding>) -> DiResult<()> {
        if binding.created_type() != self.element {
            return Err(DiError::illegal_state(format!(
                "集合绑定的元素类型为 {}, 不能加入产出 {} 的绑定",
                self.element,
                binding.created_type()
            )));
        }
        self.set.write().push(binding);
        Ok(())
    }
}

impl DiBinding for SetBinding {
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
        "set"
    }

    fn get_factory(&self, di: DirectDi, key: &DiKey) -> DiResult<BindingFn> {
        let element_key = DiKey::new(
            key.context_type.clone(),
            key.arg_type.clone(),
            self.element.clone(),
            key.tag.clone(),
        );
        let factories = self
            .set
            .read()
            .iter()
            .map(|binding| binding.get_factory(di.clone(), &element_key))
            .collect::<DiResult<Vec<_>>>()?;
        let collect = self.collect.clone();
        Ok(Box::new(move |arg| {
            let values = factories
                .iter()
                .map(|factory| factory(arg.clone()))
                .collect::<DiResult<Vec<_>>>()?;
            collect(values)
        }))
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// 子类型分发绑定
///
/// 注册在一个开放的结果描述符上（例如带通配符参数的参数化类型），
/// 解析时按请求的实际结果描述符选择具体绑定，选择结果按描述符缓存。
pub struct SubtypeDispatch {
    created: TypeToken,
    block: DispatchBlock,
    cache: RwLock<HashMap<TypeToken, Arc<dyn DiBinding>>>,
}

impl SubtypeDispatch {
    /// 构造分发绑定
    ///
    /// `created` 是参与兼容查找的开放描述符，`block` 根据请求的
    /// 具体描述符给出实际使用的绑定。
    pub fn new(
        created: TypeToken,
        block: impl Fn(&TypeToken) -> DiResult<Arc<dyn DiBinding>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            created,
            block: Arc::new(block),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl DiBinding for SubtypeDispatch {
    fn context_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn arg_type(&self) -> TypeToken {
        TypeToken::Any
    }

    fn created_type(&self) -> TypeToken {
        self.created.clone()
    }

    fn factory_name(&self) -> &'static str {
        "subtypes"
    }

    fn supports_sub_types(&self) -> bool {
        true
    }

    fn get_factory(&self, di: DirectDi, key: &DiKey) -> DiResult<BindingFn> {
        let cached = self.cache.read().get(&key.result_type).cloned();
        let binding = match cached {
            Some(binding) => binding,
            None => {
                let binding = (self.block)(&key.result_type)?;
                self.cache
                    .write()
                    .entry(key.result_type.clone())
                    .or_insert_with(|| binding.clone());
                binding
            }
        };
        binding.get_factory(di, key)
    }
}

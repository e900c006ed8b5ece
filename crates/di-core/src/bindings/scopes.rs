//! 作用域与作用域注册表
//!
//! 作用域负责把外部上下文对象（例如一次会话）映射到一个缓存已创建
//! 实例的注册表；注册表保证同一子键下的创建至多并发执行一次。

use super::AnyValue;
use crate::errors::{DiError, DiResult};
use parking_lot::{Mutex, ReentrantMutex};
use std::any::Any;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// 可作为多例缓存键的参数
///
/// 对所有 `Eq + Hash` 的类型做了统一实现，比较语义为值相等。
pub trait ScopeArg: Send + Sync + 'static {
    /// 值相等比较
    fn arg_eq(&self, other: &dyn ScopeArg) -> bool;

    /// 值哈希
    fn arg_hash(&self) -> u64;

    /// 以 `Any` 形式暴露自身
    fn as_any(&self) -> &dyn Any;
}

impl<T: Eq + Hash + Send + Sync + 'static> ScopeArg for T {
    fn arg_eq(&self, other: &dyn ScopeArg) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|o| self == o)
    }

    fn arg_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::any::TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 作用域缓存子键：绑定标识加上可选的多例参数
#[derive(Clone)]
pub struct ScopeKey {
    binding_id: u64,
    arg: Option<Arc<dyn ScopeArg>>,
}

impl ScopeKey {
    /// 无参数绑定（单例）的子键
    pub fn no_arg(binding_id: u64) -> Self {
        Self {
            binding_id,
            arg: None,
        }
    }

    /// 携带多例参数的子键
    pub fn with_arg(binding_id: u64, arg: Arc<dyn ScopeArg>) -> Self {
        Self {
            binding_id,
            arg: Some(arg),
        }
    }
}

impl PartialEq for ScopeKey {
    fn eq(&self, other: &Self) -> bool {
        self.binding_id == other.binding_id
            && match (&self.arg, &other.arg) {
                (None, None) => true,
                (Some(a), Some(b)) => a.arg_eq(b.as_ref()),
                _ => false,
            }
    }
}

impl Eq for ScopeKey {}

impl Hash for ScopeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binding_id.hash(state);
        if let Some(arg) = &self.arg {
            arg.arg_hash().hash(state);
        }
    }
}

impl fmt::Debug for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeKey")
            .field("binding_id", &self.binding_id)
            .field("has_arg", &self.arg.is_some())
            .finish()
    }
}

/// 需要在移出作用域时释放资源的值
pub trait ScopeCloseable {
    /// 释放资源
    fn close(&self);
}

/// 作用域缓存条目：值加上可选的释放回调
#[derive(Clone)]
pub struct ScopeEntry {
    value: AnyValue,
    closer: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ScopeEntry {
    /// 普通条目，移除时仅丢弃引用
    pub fn plain(value: AnyValue) -> Self {
        Self {
            value,
            closer: None,
        }
    }

    /// 可释放条目，移除或清空时调用 [`ScopeCloseable::close`]
    pub fn closeable<T: ScopeCloseable + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let closer = {
            let value = value.clone();
            Arc::new(move || value.close()) as Arc<dyn Fn() + Send + Sync>
        };
        Self {
            value,
            closer: Some(closer),
        }
    }

    /// 条目持有的值
    pub fn value(&self) -> &AnyValue {
        &self.value
    }

    fn close(&self) {
        if let Some(closer) = &self.closer {
            closer();
        }
    }
}

/// 作用域注册表 trait
///
/// 每个作用域上下文对应一个注册表实例，注册表内部使用可重入锁，
/// 创建函数因此可以安全地执行嵌套解析；锁按注册表（即按上下文）
/// 粒度持有，互不相关的上下文不会相互串行化。
pub trait ScopeRegistry: Send + Sync {
    /// 取出已缓存的值，不存在则调用 `creator` 创建并缓存
    ///
    /// 同一子键下保证创建至多并发执行一次：后到的并发调用方阻塞
    /// 到先到者创建完成并取得同一实例。创建失败不会被缓存，
    /// 错误传播给触发创建的调用方。
    fn get_or_create(
        &self,
        key: ScopeKey,
        creator: &mut dyn FnMut() -> DiResult<ScopeEntry>,
    ) -> DiResult<AnyValue>;

    /// 仅查询，不触发创建
    fn get(&self, key: &ScopeKey) -> Option<AnyValue>;

    /// 当前缓存的全部条目
    fn values(&self) -> Vec<(ScopeKey, AnyValue)>;

    /// 移除单个条目并释放其资源
    fn remove(&self, key: &ScopeKey) -> DiResult<()>;

    /// 清空注册表并释放全部资源
    fn clear(&self);

    /// 当前缓存的条目数量
    fn len(&self) -> usize;

    /// 注册表是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 标准的多条目作用域注册表
pub struct MultiItemScopeRegistry {
    cache: ReentrantMutex<RefCell<HashMap<ScopeKey, ScopeEntry>>>,
}

impl MultiItemScopeRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            cache: ReentrantMutex::new(RefCell::new(HashMap::new())),
        }
    }
}

impl Default for MultiItemScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry for MultiItemScopeRegistry {
    fn get_or_create(
        &self,
        key: ScopeKey,
        creator: &mut dyn FnMut() -> DiResult<ScopeEntry>,
    ) -> DiResult<AnyValue> {
        let guard = self.cache.lock();
        if let Some(value) = guard.borrow().get(&key).map(|e| e.value.clone()) {
            return Ok(value);
        }
        // 创建期间不持有 RefCell 借用，嵌套解析可重入同一把锁
        let entry = creator()?;
        let value = entry.value.clone();
        guard.borrow_mut().insert(key, entry);
        Ok(value)
    }

    fn get(&self, key: &ScopeKey) -> Option<AnyValue> {
        let guard = self.cache.lock();
        let value = guard.borrow().get(key).map(|e| e.value.clone());
        value
    }

    fn values(&self) -> Vec<(ScopeKey, AnyValue)> {
        let guard = self.cache.lock();
        let values = guard
            .borrow()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        values
    }

    fn remove(&self, key: &ScopeKey) -> DiResult<()> {
        let removed = {
            let guard = self.cache.lock();
            let removed = guard.borrow_mut().remove(key);
            removed
        };
        if let Some(entry) = removed {
            entry.close();
        }
        Ok(())
    }

    fn clear(&self) {
        let entries: Vec<ScopeEntry> = {
            let guard = self.cache.lock();
            let entries = guard.borrow_mut().drain().map(|(_, e)| e).collect();
            entries
        };
        for entry in entries {
            entry.close();
        }
    }

    fn len(&self) -> usize {
        let guard = self.cache.lock();
        let len = guard.borrow().len();
        len
    }
}

/// 只保存单个条目的作用域注册表
///
/// 子键变化时替换所持有的值，被替换的旧值在锁外释放。
pub struct SingleItemScopeRegistry {
    slot: ReentrantMutex<RefCell<Option<(ScopeKey, ScopeEntry)>>>,
}

impl SingleItemScopeRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            slot: ReentrantMutex::new(RefCell::new(None)),
        }
    }
}

impl Default for SingleItemScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry for SingleItemScopeRegistry {
    fn get_or_create(
        &self,
        key: ScopeKey,
        creator: &mut dyn FnMut() -> DiResult<ScopeEntry>,
    ) -> DiResult<AnyValue> {
        let guard = self.slot.lock();
        let held = guard
            .borrow()
            .as_ref()
            .and_then(|(k, e)| (*k == key).then(|| e.value.clone()));
        if let Some(value) = held {
            return Ok(value);
        }
        let entry = creator()?;
        let value = entry.value.clone();
        let old = guard.borrow_mut().replace((key, entry));
        drop(guard);
        if let Some((_, entry)) = old {
            entry.close();
        }
        Ok(value)
    }

    fn get(&self, key: &ScopeKey) -> Option<AnyValue> {
        let guard = self.slot.lock();
        let value = guard
            .borrow()
            .as_ref()
            .and_then(|(k, e)| (k == key).then(|| e.value.clone()));
        value
    }

    fn values(&self) -> Vec<(ScopeKey, AnyValue)> {
        let guard = self.slot.lock();
        let values = guard
            .borrow()
            .as_ref()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .into_iter()
            .collect();
        values
    }

    fn remove(&self, key: &ScopeKey) -> DiResult<()> {
        let removed = {
            let guard = self.slot.lock();
            let holds_other = guard.borrow().as_ref().is_some_and(|(k, _)| k != key);
            if holds_other {
                return Err(DiError::illegal_state(
                    "单条目作用域注册表当前持有不同的子键",
                ));
            }
            let removed = guard.borrow_mut().take();
            removed
        };
        if let Some((_, entry)) = removed {
            entry.close();
        }
        Ok(())
    }

    fn clear(&self) {
        let removed = {
            let guard = self.slot.lock();
            let removed = guard.borrow_mut().take();
            removed
        };
        if let Some((_, entry)) = removed {
            entry.close();
        }
    }

    fn len(&self) -> usize {
        let guard = self.slot.lock();
        let len = usize::from(guard.borrow().is_some());
        len
    }
}

/// 注册表形态
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegistryKind {
    /// 多条目
    MultiItem,
    /// 单条目
    SingleItem,
}

/// 按形态创建注册表
pub fn new_registry(kind: RegistryKind) -> Arc<dyn ScopeRegistry> {
    match kind {
        RegistryKind::MultiItem => Arc::new(MultiItemScopeRegistry::new()),
        RegistryKind::SingleItem => Arc::new(SingleItemScopeRegistry::new()),
    }
}

/// 作用域 trait
///
/// 按上下文返回（或创建）对应的注册表。核心库不观察任何平台
/// 生命周期，平台适配层通过 [`DiScope::get_registry`] 取得注册表，
/// 并在生命周期结束事件中自行调用 [`ScopeRegistry::clear`]。
pub trait DiScope: Send + Sync {
    /// 取得给定上下文对应的注册表
    ///
    /// 对同一上下文必须始终返回同一个注册表。
    fn get_registry(&self, context: Option<&AnyValue>) -> DiResult<Arc<dyn ScopeRegistry>>;
}

/// 默认作用域：忽略上下文，始终返回同一个注册表
///
/// 无作用域的单例即缓存于此，等价于进程级的单个缓存条目。
pub struct NoScope {
    registry: Arc<MultiItemScopeRegistry>,
}

impl NoScope {
    /// 创建默认作用域
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MultiItemScopeRegistry::new()),
        }
    }
}

impl Default for NoScope {
    fn default() -> Self {
        Self::new()
    }
}

impl DiScope for NoScope {
    fn get_registry(&self, _context: Option<&AnyValue>) -> DiResult<Arc<dyn ScopeRegistry>> {
        Ok(self.registry.clone())
    }
}

/// 弱引用上下文作用域
///
/// 按上下文对象的引用身份关联注册表，关联为弱引用：当上下文对象
/// 不再被外部持有时，其注册表在后续访问中被回收。回收时机不确定，
/// 确定性清理请持有注册表句柄并显式调用 [`ScopeRegistry::clear`]。
pub struct WeakContextScope {
    kind: RegistryKind,
    entries: Mutex<Vec<(Weak<dyn Any + Send + Sync>, Arc<dyn ScopeRegistry>)>>,
}

impl WeakContextScope {
    /// 创建多条目形态的弱上下文作用域
    pub fn new() -> Self {
        Self::with_kind(RegistryKind::MultiItem)
    }

    /// 指定注册表形态
    pub fn with_kind(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Default for WeakContextScope {
    fn default() -> Self {
        Self::new()
    }
}

impl DiScope for WeakContextScope {
    fn get_registry(&self, context: Option<&AnyValue>) -> DiResult<Arc<dyn ScopeRegistry>> {
        let context = context.ok_or_else(|| {
            DiError::illegal_state("弱上下文作用域的解析必须提供上下文值")
        })?;
        let mut entries = self.entries.lock();
        entries.retain(|(weak, _)| weak.strong_count() > 0);
        for (weak, registry) in entries.iter() {
            if weak.upgrade().is_some_and(|held| Arc::ptr_eq(&held, context)) {
                return Ok(registry.clone());
            }
        }
        let registry = new_registry(self.kind);
        entries.push((Arc::downgrade(context), registry.clone()));
        Ok(registry)
    }
}

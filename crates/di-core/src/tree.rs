//! 绑定树：键到绑定候选的映射与兼容查找
//!
//! 精确查找是对键全量结构相等的哈希探测；精确未命中时退化为
//! 兼容扫描：结果类型协变匹配（声明支持子类型的绑定反向判定）、
//! 参数与上下文类型按可赋值判定、标签按相等判定。命中多个候选时
//! 按特定度裁决，真正的平局以歧义错误失败，绝不按注册顺序取舍。

use crate::bindings::DiBinding;
use crate::container::{ContextTranslator, ExternalSource};
use crate::errors::{DiError, DiResult};
use crate::types::{DiKey, TypeToken};
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

/// 一条已注册的绑定定义
#[derive(Clone)]
pub(crate) struct Definition {
    /// 绑定策略对象
    pub binding: Arc<dyn DiBinding>,
    /// 注册来源模块
    pub from_module: Option<String>,
}

impl Definition {
    fn describe(&self, key: &DiKey) -> String {
        match &self.from_module {
            Some(module) => format!("{key} -> {} (模块 {module})", self.binding.description()),
            None => format!("{key} -> {}", self.binding.description()),
        }
    }
}

/// 绑定树
///
/// 绑定映射在构建完成后只读，稳态解析期间无需加锁；
/// 唯一的可变结构是兼容查找的命中缓存。
pub(crate) struct BindingTree {
    bindings: HashMap<DiKey, Vec<Definition>>,
    cache: RwLock<HashMap<DiKey, DiKey>>,
    external_source: Option<Arc<dyn ExternalSource>>,
    translators: Vec<ContextTranslator>,
}

impl BindingTree {
    pub fn new(
        bindings: HashMap<DiKey, Vec<Definition>>,
        external_source: Option<Arc<dyn ExternalSource>>,
        translators: Vec<ContextTranslator>,
    ) -> Self {
        Self {
            bindings,
            cache: RwLock::new(HashMap::new()),
            external_source,
            translators,
        }
    }

    pub fn bindings(&self) -> &HashMap<DiKey, Vec<Definition>> {
        &self.bindings
    }

    pub fn external_source(&self) -> Option<&Arc<dyn ExternalSource>> {
        self.external_source.as_ref()
    }

    pub fn translators(&self) -> &[ContextTranslator] {
        &self.translators
    }

    /// 查找键对应的绑定：精确探测，未命中则兼容扫描
    ///
    /// 返回实际命中的注册键与其当前生效的定义（覆盖栈顶）。
    pub fn find(&self, key: &DiKey) -> DiResult<Option<(DiKey, Definition)>> {
        if let Some(defs) = self.bindings.get(key) {
            return Ok(defs.first().map(|d| (key.clone(), d.clone())));
        }

        if let Some(real) = self.cache.read().get(key) {
            let def = self.bindings.get(real).and_then(|defs| defs.first());
            return Ok(def.map(|d| (real.clone(), d.clone())));
        }

        let candidates = self.compatible_keys(key);
        let chosen = match candidates.len() {
            0 => return Ok(None),
            1 => candidates[0],
            _ => self.disambiguate(key, &candidates)?,
        };

        // 构建完成后键集合不再变化, 缓存条目永不失效
        self.cache.write().insert(key.clone(), chosen.clone());
        let def = self.bindings.get(chosen).and_then(|defs| defs.first());
        Ok(def.map(|d| (chosen.clone(), d.clone())))
    }

    /// 查找全部匹配的绑定，供 `all_*` 聚合检索使用
    pub fn find_all(&self, key: &DiKey) -> Vec<(DiKey, Definition)> {
        let mut result = Vec::new();
        if let Some(def) = self.bindings.get(key).and_then(|defs| defs.first()) {
            result.push((key.clone(), def.clone()));
        }
        for bound in self.compatible_keys(key) {
            if bound == key {
                continue;
            }
            if let Some(def) = self.bindings.get(bound).and_then(|defs| defs.first()) {
                result.push((bound.clone(), def.clone()));
            }
        }
        result
    }

    fn compatible_keys(&self, requested: &DiKey) -> Vec<&DiKey> {
        self.bindings
            .iter()
            .filter(|(bound, defs)| Self::matches(bound, defs, requested))
            .map(|(bound, _)| bound)
            .collect()
    }

    fn matches(bound: &DiKey, defs: &[Definition], requested: &DiKey) -> bool {
        if bound.tag != requested.tag {
            return false;
        }
        let supports_sub = defs
            .first()
            .is_some_and(|d| d.binding.supports_sub_types());
        let result_ok = if supports_sub {
            bound.result_type.is_assignable_from(&requested.result_type)
        } else {
            requested.result_type.is_assignable_from(&bound.result_type)
        };
        result_ok
            && bound.context_type.is_assignable_from(&requested.context_type)
            && bound.arg_type.is_assignable_from(&requested.arg_type)
    }

    /// 特定度裁决：结果类型最窄、参数类型最宽者胜出
    fn disambiguate<'a>(
        &self,
        requested: &DiKey,
        candidates: &[&'a DiKey],
    ) -> DiResult<&'a DiKey> {
        let score = |key: &DiKey| {
            (
                key.result_type.specificity(),
                Reverse(key.arg_type.specificity()),
            )
        };
        let best = candidates
            .iter()
            .max_by_key(|key| score(key))
            .copied()
            .ok_or_else(|| DiError::illegal_state("兼容查找候选列表为空"))?;
        let tied = candidates
            .iter()
            .filter(|key| score(key) == score(best))
            .count();
        if tied > 1 {
            return Err(DiError::AmbiguousBinding {
                key: requested.to_string(),
                candidates: candidates.iter().map(|key| key.to_string()).collect(),
            });
        }
        Ok(best)
    }

    /// 与给定结果类型相关的绑定描述，用于未命中诊断
    pub fn description_for_result(&self, result_type: &TypeToken) -> String {
        let mut lines: Vec<String> = self
            .bindings
            .iter()
            .filter(|(bound, _)| {
                bound.result_type == *result_type
                    || result_type.is_assignable_from(&bound.result_type)
            })
            .flat_map(|(bound, defs)| defs.iter().map(|d| format!("  {}", d.describe(bound))))
            .collect();
        if lines.is_empty() {
            return String::new();
        }
        lines.sort();
        format!("\n该结果类型的可用绑定:\n{}", lines.join("\n"))
    }
}

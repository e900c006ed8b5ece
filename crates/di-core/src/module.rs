//! 可复用的绑定模块
//!
//! 模块是一段带名字的配置函数，按名字保证导入幂等。模块本身
//! 不持有任何绑定，只有在被导入时才对构建器生效。

use crate::builder::DiBuilder;
use crate::errors::DiResult;
use std::sync::Arc;

type InitFn = Arc<dyn Fn(&mut DiBuilder) -> DiResult<()> + Send + Sync>;

/// 依赖注入模块
#[derive(Clone)]
pub struct DiModule {
    name: String,
    allow_silent_override: bool,
    init: InitFn,
}

impl DiModule {
    /// 创建模块，`init` 在每次首次导入时执行
    pub fn new(
        name: impl Into<String>,
        init: impl Fn(&mut DiBuilder) -> DiResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            allow_silent_override: false,
            init: Arc::new(init),
        }
    }

    /// 模块体内允许静默覆盖
    ///
    /// 仅在以允许覆盖的方式导入时生效，否则模块体内仍禁止覆盖。
    pub fn with_silent_override(mut self, allow: bool) -> Self {
        self.allow_silent_override = allow;
        self
    }

    /// 模块名，导入幂等以此为准
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn allow_silent_override(&self) -> bool {
        self.allow_silent_override
    }

    pub(crate) fn apply(&self, builder: &mut DiBuilder) -> DiResult<()> {
        (self.init)(builder)
    }
}

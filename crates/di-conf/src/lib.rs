//! # DI Conf
//!
//! 这个 crate 在核心容器之上提供可推迟构建的配置容器
//! [`ConfigurableDi`]，以及进程级的全局容器 [`global`]。
//!
//! 配置容器是一个两阶段状态机：配置期累积配置函数，首次检索时
//! 一次性构建不可变容器；声明为可变的容器可以清空重配，用于测试
//! 中替换绑定。

use di_core::builder::DiBuilder;
use di_core::{Di, DiError, DiModule, DiResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

type ConfigFn = Box<dyn FnOnce(&mut DiBuilder) -> DiResult<()> + Send>;

enum State {
    Configuring(Vec<ConfigFn>),
    Constructed(Di),
}

/// 可配置容器
///
/// 构建被推迟到首次检索；在此之前可以分多次追加配置。构建之后
/// 追加配置仅对声明为可变的容器合法，此时既有容器的全部绑定被
/// 继承进新一轮配置。
pub struct ConfigurableDi {
    state: Mutex<State>,
    mutable: Mutex<Option<bool>>,
    base_extends: Mutex<Vec<Di>>,
}

impl ConfigurableDi {
    /// 创建不可变的配置容器
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Configuring(Vec::new())),
            mutable: Mutex::new(None),
            base_extends: Mutex::new(Vec::new()),
        }
    }

    /// 创建可变的配置容器
    pub fn new_mutable() -> Self {
        let di = Self::new();
        *di.mutable.lock() = Some(true);
        di
    }

    /// 容器是否可变
    pub fn is_mutable(&self) -> bool {
        self.mutable.lock().unwrap_or(false)
    }

    /// 设定可变性，只允许在首次构建之前、且与既有声明一致时调用
    pub fn set_mutable(&self, mutable: bool) -> DiResult<()> {
        if matches!(&*self.state.lock(), State::Constructed(_)) {
            return Err(DiError::illegal_state("容器已构建, 不能再更改可变性"));
        }
        let mut slot = self.mutable.lock();
        match *slot {
            Some(current) if current != mutable => {
                Err(DiError::illegal_state("容器的可变性已声明为相反值"))
            }
            _ => {
                *slot = Some(mutable);
                Ok(())
            }
        }
    }

    /// 当前是否可以追加配置
    pub fn can_configure(&self) -> bool {
        self.is_mutable() || matches!(&*self.state.lock(), State::Configuring(_))
    }

    /// 追加一段配置
    ///
    /// 容器已构建且不可变时失败；可变容器上的追加会重开配置期，
    /// 既有容器的绑定被继承且可被静默覆盖。
    pub fn add_config(
        &self,
        config: impl FnOnce(&mut DiBuilder) -> DiResult<()> + Send + 'static,
    ) -> DiResult<()> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Configuring(configs) => {
                configs.push(Box::new(config));
                Ok(())
            }
            State::Constructed(di) => {
                if !self.is_mutable() {
                    return Err(DiError::illegal_state(
                        "容器已构建且不可变, 不能追加配置",
                    ));
                }
                debug!("可变容器重开配置期");
                let previous = di.clone();
                *state = State::Configuring(vec![
                    Box::new(move |builder| {
                        builder.extend(&previous, true);
                        Ok(())
                    }),
                    Box::new(config),
                ]);
                Ok(())
            }
        }
    }

    /// 追加一个模块导入
    pub fn add_import(&self, module: DiModule) -> DiResult<()> {
        self.add_config(move |builder| builder.import(&module))
    }

    /// 继承另一个容器的全部绑定
    ///
    /// 继承关系被记录下来，可变容器清空后重配仍以这些容器为基础。
    pub fn add_extend(&self, di: Di) -> DiResult<()> {
        self.base_extends.lock().push(di.clone());
        self.add_config(move |builder| {
            builder.extend(&di, false);
            Ok(())
        })
    }

    /// 取得容器，必要时先构建
    ///
    /// 构建在内部锁保护下至多发生一次，就绪回调（含急切单例）
    /// 在首个调用方拿到容器之前执行完毕。
    pub fn get_or_construct(&self) -> DiResult<Di> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Constructed(di) => Ok(di.clone()),
            State::Configuring(configs) => {
                debug!(configs = configs.len(), "构建配置容器");
                let configs = std::mem::take(configs);
                let (di, callbacks) = Di::with_delayed_callbacks(false, move |builder| {
                    for config in configs {
                        config(builder)?;
                    }
                    Ok(())
                })?;
                callbacks.run()?;
                *state = State::Constructed(di.clone());
                Ok(di)
            }
        }
    }

    /// 清空容器，回到配置期
    ///
    /// 仅可变容器允许清空；通过 [`ConfigurableDi::add_extend`]
    /// 建立的继承关系在清空后保留。
    pub fn clear(&self) -> DiResult<()> {
        if !self.is_mutable() {
            return Err(DiError::illegal_state("不可变容器不能清空"));
        }
        debug!("清空配置容器");
        let mut state = self.state.lock();
        let bases = self.base_extends.lock().clone();
        let configs = bases
            .into_iter()
            .map(|base| {
                Box::new(move |builder: &mut DiBuilder| {
                    builder.extend(&base, false);
                    Ok(())
                }) as ConfigFn
            })
            .collect();
        *state = State::Configuring(configs);
        Ok(())
    }
}

impl Default for ConfigurableDi {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<ConfigurableDi> = Lazy::new(ConfigurableDi::new_mutable);

/// 进程级全局容器
///
/// 全局容器始终可变，测试可以清空后重新配置。
pub fn global() -> &'static ConfigurableDi {
    &GLOBAL
}

//! 错误类型定义

use thiserror::Error;

/// 依赖注入错误类型
///
/// 所有错误对触发它的那次调用都是不可恢复的，库内部不做重试，
/// 也不自行记录日志，统一以返回值形式交由调用方处置。
#[derive(Error, Debug)]
pub enum DiError {
    /// 检索键没有命中任何绑定，`available` 携带相关绑定的诊断描述
    #[error("未找到绑定: {key}{available}")]
    NotFound {
        /// 未命中的检索键
        key: String,
        /// 同结果类型的可用绑定描述
        available: String,
    },

    /// 在途解析链上再次出现了同一个键
    #[error("检测到依赖循环:\n{chain}")]
    DependencyLoop {
        /// 从最外层到最内层的键路径
        chain: String,
    },

    /// 绑定注册违反了当前配置域的覆盖规则
    #[error("绑定覆盖冲突: {key}, 模块: {module}, 原因: {message}")]
    OverrideConflict {
        /// 冲突的绑定键
        key: String,
        /// 注册来源（模块名或根配置）
        module: String,
        /// 具体的冲突原因
        message: String,
    },

    /// 兼容查找命中多个特定度相同的候选绑定
    #[error("兼容查找存在歧义: {key}, 候选绑定: {candidates:?}")]
    AmbiguousBinding {
        /// 引发歧义的检索键
        key: String,
        /// 平局的候选绑定键
        candidates: Vec<String>,
    },

    /// 容器或作用域处于不允许该操作的状态
    #[error("容器状态非法: {message}")]
    IllegalState {
        /// 状态描述
        message: String,
    },

    /// 绑定的创建函数执行失败
    #[error("组件创建失败: {type_name}, 原因: {source}")]
    CreationFailed {
        /// 创建失败的结果类型名称
        type_name: String,
        /// 底层错误
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 类型擦除值还原为具体类型失败
    #[error("类型转换失败: 期望 {expected}")]
    TypeMismatch {
        /// 期望的目标类型名称
        expected: String,
    },
}

impl DiError {
    /// 创建状态非法错误
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// 创建组件创建失败错误
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CreationFailed {
            type_name: type_name.into(),
            source: Box::new(source),
        }
    }

    /// 是否为“未找到绑定”错误
    ///
    /// `-or_none` 系列调用仅将该类错误转换为 `None`，
    /// 依赖循环与歧义错误始终向上传播。
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// 结果类型别名
pub type DiResult<T> = Result<T, DiError>;

//! 类型标识与绑定键定义
//!
//! Rust 没有运行时泛型反射，类型标识通过显式的描述符值表达：
//! 具体类型由 [`TypeToken::of`] 从 `TypeId` 构造，携带类型参数的
//! 泛型绑定由调用方通过 [`TypeToken::parametrized`] 手工构造。

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型标识描述符
///
/// 绑定与查找使用同一种描述符构造方式（`of` 或手工描述符），
/// 混用两种构造方式属于调用方错误，查找将不会命中。
#[derive(Clone, Debug, Eq)]
pub enum TypeToken {
    /// 任意类型，用作开放的上下文/参数位置
    Any,
    /// 具体的 Rust 类型
    Leaf {
        /// 类型的运行时标识
        id: TypeId,
        /// 类型名称，仅用于诊断输出
        name: &'static str,
    },
    /// 携带类型参数的参数化类型描述符
    Parametrized {
        /// 原始类型名称
        raw: &'static str,
        /// 类型参数描述符列表
        args: Vec<TypeToken>,
    },
    /// 通配符类型参数
    Wildcard,
}

impl TypeToken {
    /// 从具体 Rust 类型构造叶子描述符
    pub fn of<T: 'static>() -> Self {
        Self::Leaf {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// 构造参数化类型描述符
    pub fn parametrized(raw: &'static str, args: Vec<TypeToken>) -> Self {
        Self::Parametrized { raw, args }
    }

    /// 无参数绑定使用的单位类型描述符
    pub fn unit() -> Self {
        Self::of::<()>()
    }

    /// 判断 `other` 描述的类型是否可以赋值给 `self` 描述的类型
    ///
    /// 类型擦除平台上的判定规则：`Any` 接受一切；`Wildcard` 在参数
    /// 位置接受一切；叶子类型按 `TypeId` 相等判定；参数化类型要求
    /// 原始名称相等且各类型参数逐一可赋值。
    pub fn is_assignable_from(&self, other: &TypeToken) -> bool {
        match (self, other) {
            (Self::Any, _) | (Self::Wildcard, _) => true,
            (Self::Leaf { id: a, .. }, Self::Leaf { id: b, .. }) => a == b,
            (
                Self::Parametrized { raw: r1, args: a1 },
                Self::Parametrized { raw: r2, args: a2 },
            ) => {
                r1 == r2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x.is_assignable_from(y))
            }
            _ => false,
        }
    }

    /// 描述符的特定度，用于兼容查找的歧义裁决
    ///
    /// 越具体的描述符得分越高：`Any` 与 `Wildcard` 记 0，叶子记 1，
    /// 参数化类型为 1 加各参数特定度之和。
    pub fn specificity(&self) -> usize {
        match self {
            Self::Any | Self::Wildcard => 0,
            Self::Leaf { .. } => 1,
            Self::Parametrized { args, .. } => 1 + args.iter().map(Self::specificity).sum::<usize>(),
        }
    }

    /// 简化显示名称（去掉模块路径前缀）
    fn simple_name(name: &str) -> &str {
        match name.find('<') {
            Some(_) => name,
            None => name.rsplit("::").next().unwrap_or(name),
        }
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, Self::Any) | (Self::Wildcard, Self::Wildcard) => true,
            (Self::Leaf { id: a, .. }, Self::Leaf { id: b, .. }) => a == b,
            (
                Self::Parametrized { raw: r1, args: a1 },
                Self::Parametrized { raw: r2, args: a2 },
            ) => r1 == r2 && a1 == a2,
            _ => false,
        }
    }
}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Any => 0u8.hash(state),
            Self::Leaf { id, .. } => {
                1u8.hash(state);
                id.hash(state);
            }
            Self::Parametrized { raw, args } => {
                2u8.hash(state);
                raw.hash(state);
                args.hash(state);
            }
            Self::Wildcard => 3u8.hash(state),
        }
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Wildcard => write!(f, "?"),
            Self::Leaf { name, .. } => write!(f, "{}", Self::simple_name(name)),
            Self::Parametrized { raw, args } => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
        }
    }
}

/// 绑定标签
///
/// 不透明的可比较值，用于区分同一结果类型下的多个绑定。
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Tag {
    /// 字符串标签
    Str(String),
    /// 整数标签
    Int(i64),
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Tag {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// 便捷函数：构造可选标签
pub fn tag(value: impl Into<Tag>) -> Option<Tag> {
    Some(value.into())
}

/// 绑定键
///
/// 由（上下文类型、参数类型、结果类型、标签）四元组构成的复合标识，
/// 当且仅当四个字段全部相等时两个键相等。
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiKey {
    /// 上下文类型
    pub context_type: TypeToken,
    /// 参数类型
    pub arg_type: TypeToken,
    /// 结果类型
    pub result_type: TypeToken,
    /// 可选标签
    pub tag: Option<Tag>,
}

impl DiKey {
    /// 构造完整的绑定键
    pub fn new(
        context_type: TypeToken,
        arg_type: TypeToken,
        result_type: TypeToken,
        tag: Option<Tag>,
    ) -> Self {
        Self {
            context_type,
            arg_type,
            result_type,
            tag,
        }
    }

    /// 无参数、任意上下文的查找键
    pub fn no_arg(result_type: TypeToken, tag: Option<Tag>) -> Self {
        Self::new(TypeToken::Any, TypeToken::unit(), result_type, tag)
    }

    /// 替换上下文类型，其余字段不变
    pub fn with_context(&self, context_type: TypeToken) -> Self {
        Self {
            context_type,
            ..self.clone()
        }
    }
}

impl fmt::Display for DiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bind<{}>", self.result_type)?;
        if let Some(tag) = &self.tag {
            write!(f, "(tag = {tag})")?;
        }
        write!(
            f,
            " with ? {{ {} -> ({}) -> {} }}",
            self.context_type, self.arg_type, self.result_type
        )
    }
}

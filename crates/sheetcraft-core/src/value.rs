//! Tagged primitive values.
//!
//! [`AnyBase`] is the runtime cell produced for every scalar token the value
//! grammar accepts. It holds exactly one primitive variant (or `Null`) and
//! compares only against values of the same variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::BaseKind;

// ---------------------------------------------------------------------------
// Boolean vocabulary
// ---------------------------------------------------------------------------

/// Tokens read as `true`. ASCII entries compare case-insensitively.
pub const TRUE_WORDS: &[&str] = &["true", "yes", "y", "on", "1", "是", "真", "对"];

/// Tokens read as `false`. ASCII entries compare case-insensitively.
pub const FALSE_WORDS: &[&str] = &["false", "no", "n", "off", "0", "否", "假", "错"];

/// Look a word up in the boolean vocabulary.
pub fn parse_bool_word(word: &str) -> Option<bool> {
    let word = word.trim();
    if TRUE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        Some(true)
    } else if FALSE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// AnyBase
// ---------------------------------------------------------------------------

/// A single primitive value, or no value at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum AnyBase {
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl AnyBase {
    /// The zero/empty value of a base kind. Links and enums are carried as
    /// text, so their default is the empty string.
    pub fn default_for(kind: BaseKind) -> Self {
        match kind {
            BaseKind::Null | BaseKind::Custom => AnyBase::Null,
            BaseKind::Bool => AnyBase::Bool(false),
            BaseKind::Int8 => AnyBase::Int8(0),
            BaseKind::Int16 => AnyBase::Int16(0),
            BaseKind::Int32 => AnyBase::Int32(0),
            BaseKind::Int64 => AnyBase::Int64(0),
            BaseKind::UInt8 => AnyBase::UInt8(0),
            BaseKind::UInt16 => AnyBase::UInt16(0),
            BaseKind::UInt32 => AnyBase::UInt32(0),
            BaseKind::UInt64 => AnyBase::UInt64(0),
            BaseKind::Float32 => AnyBase::Float32(0.0),
            BaseKind::Float64 => AnyBase::Float64(0.0),
            BaseKind::String | BaseKind::Link | BaseKind::Enum => AnyBase::String(String::new()),
        }
    }

    /// The base kind of the active variant. Text values report `String`.
    pub fn kind(&self) -> BaseKind {
        match self {
            AnyBase::Null => BaseKind::Null,
            AnyBase::Bool(_) => BaseKind::Bool,
            AnyBase::Int8(_) => BaseKind::Int8,
            AnyBase::Int16(_) => BaseKind::Int16,
            AnyBase::Int32(_) => BaseKind::Int32,
            AnyBase::Int64(_) => BaseKind::Int64,
            AnyBase::UInt8(_) => BaseKind::UInt8,
            AnyBase::UInt16(_) => BaseKind::UInt16,
            AnyBase::UInt32(_) => BaseKind::UInt32,
            AnyBase::UInt64(_) => BaseKind::UInt64,
            AnyBase::Float32(_) => BaseKind::Float32,
            AnyBase::Float64(_) => BaseKind::Float64,
            AnyBase::String(_) => BaseKind::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AnyBase::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyBase::String(s) => Some(s),
            _ => None,
        }
    }

    /// Best-effort boolean. Numbers are `true` when non-zero; text goes
    /// through the boolean vocabulary and then numeric parsing.
    pub fn as_bool(&self) -> bool {
        match self {
            AnyBase::Null => false,
            AnyBase::Bool(b) => *b,
            AnyBase::Float32(v) => *v != 0.0,
            AnyBase::Float64(v) => *v != 0.0,
            AnyBase::String(s) => {
                parse_bool_word(s)
                    .unwrap_or_else(|| s.trim().parse::<f64>().is_ok_and(|v| v != 0.0))
            }
            _ => self.as_i64() != 0,
        }
    }

    /// Best-effort signed integer. Floats truncate; unparsable text is `0`.
    pub fn as_i64(&self) -> i64 {
        match self {
            AnyBase::Null => 0,
            AnyBase::Bool(b) => i64::from(*b),
            AnyBase::Int8(v) => i64::from(*v),
            AnyBase::Int16(v) => i64::from(*v),
            AnyBase::Int32(v) => i64::from(*v),
            AnyBase::Int64(v) => *v,
            AnyBase::UInt8(v) => i64::from(*v),
            AnyBase::UInt16(v) => i64::from(*v),
            AnyBase::UInt32(v) => i64::from(*v),
            AnyBase::UInt64(v) => i64::try_from(*v).unwrap_or(i64::MAX),
            AnyBase::Float32(v) => *v as i64,
            AnyBase::Float64(v) => *v as i64,
            AnyBase::String(s) => parse_text_number(s).map(|v| v as i64).unwrap_or(0),
        }
    }

    /// Best-effort unsigned integer. Negative values clamp to `0`.
    pub fn as_u64(&self) -> u64 {
        match self {
            AnyBase::UInt64(v) => *v,
            AnyBase::Float32(v) => *v as u64,
            AnyBase::Float64(v) => *v as u64,
            AnyBase::String(s) => match s.trim().parse::<u64>() {
                Ok(v) => v,
                Err(_) => parse_text_number(s).map(|v| v as u64).unwrap_or(0),
            },
            other => u64::try_from(other.as_i64()).unwrap_or(0),
        }
    }

    /// Best-effort float.
    pub fn as_f64(&self) -> f64 {
        match self {
            AnyBase::Float32(v) => f64::from(*v),
            AnyBase::Float64(v) => *v,
            AnyBase::UInt64(v) => *v as f64,
            AnyBase::String(s) => parse_text_number(s).unwrap_or(0.0),
            other => other.as_i64() as f64,
        }
    }
}

fn parse_text_number(text: &str) -> Option<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .or_else(|| parse_bool_word(text).map(|b| if b { 1.0 } else { 0.0 }))
}

// ---------------------------------------------------------------------------
// Equality and hashing
// ---------------------------------------------------------------------------

impl PartialEq for AnyBase {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AnyBase::Null, AnyBase::Null) => true,
            (AnyBase::Bool(a), AnyBase::Bool(b)) => a == b,
            (AnyBase::Int8(a), AnyBase::Int8(b)) => a == b,
            (AnyBase::Int16(a), AnyBase::Int16(b)) => a == b,
            (AnyBase::Int32(a), AnyBase::Int32(b)) => a == b,
            (AnyBase::Int64(a), AnyBase::Int64(b)) => a == b,
            (AnyBase::UInt8(a), AnyBase::UInt8(b)) => a == b,
            (AnyBase::UInt16(a), AnyBase::UInt16(b)) => a == b,
            (AnyBase::UInt32(a), AnyBase::UInt32(b)) => a == b,
            (AnyBase::UInt64(a), AnyBase::UInt64(b)) => a == b,
            // Bit comparison keeps Eq reflexive for NaN.
            (AnyBase::Float32(a), AnyBase::Float32(b)) => a.to_bits() == b.to_bits(),
            (AnyBase::Float64(a), AnyBase::Float64(b)) => a.to_bits() == b.to_bits(),
            (AnyBase::String(a), AnyBase::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AnyBase {}

impl Hash for AnyBase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AnyBase::Null => {}
            AnyBase::Bool(v) => v.hash(state),
            AnyBase::Int8(v) => v.hash(state),
            AnyBase::Int16(v) => v.hash(state),
            AnyBase::Int32(v) => v.hash(state),
            AnyBase::Int64(v) => v.hash(state),
            AnyBase::UInt8(v) => v.hash(state),
            AnyBase::UInt16(v) => v.hash(state),
            AnyBase::UInt32(v) => v.hash(state),
            AnyBase::UInt64(v) => v.hash(state),
            AnyBase::Float32(v) => v.to_bits().hash(state),
            AnyBase::Float64(v) => v.to_bits().hash(state),
            AnyBase::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for AnyBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyBase::Null => f.write_str("null"),
            AnyBase::Bool(v) => write!(f, "{v}"),
            AnyBase::Int8(v) => write!(f, "{v}"),
            AnyBase::Int16(v) => write!(f, "{v}"),
            AnyBase::Int32(v) => write!(f, "{v}"),
            AnyBase::Int64(v) => write!(f, "{v}"),
            AnyBase::UInt8(v) => write!(f, "{v}"),
            AnyBase::UInt16(v) => write!(f, "{v}"),
            AnyBase::UInt32(v) => write!(f, "{v}"),
            AnyBase::UInt64(v) => write!(f, "{v}"),
            AnyBase::Float32(v) => write!(f, "{v}"),
            AnyBase::Float64(v) => write!(f, "{v}"),
            AnyBase::String(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AnyBase {
                fn from(value: $ty) -> Self {
                    AnyBase::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
}

impl From<&str> for AnyBase {
    fn from(value: &str) -> Self {
        AnyBase::String(value.to_string())
    }
}

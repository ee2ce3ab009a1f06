use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::AnyBase;

/// Generic nested value handed to the emission stage.
///
/// Composites become [`StructuralValue::Object`] with one entry per field in
/// declaration order. Arrays become [`StructuralValue::List`]; dictionaries
/// become a `List` of interleaved keys and values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralValue {
    #[default]
    Null,
    Scalar(AnyBase),
    Object(Vec<StructuralValue>),
    List(Vec<StructuralValue>),
}

impl StructuralValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StructuralValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&AnyBase> {
        match self {
            StructuralValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Items of a `List` or `Object`.
    pub fn items(&self) -> Option<&[StructuralValue]> {
        match self {
            StructuralValue::Object(items) | StructuralValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<AnyBase> for StructuralValue {
    fn from(value: AnyBase) -> Self {
        match value {
            AnyBase::Null => StructuralValue::Null,
            other => StructuralValue::Scalar(other),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StructuralValue {
                fn from(value: $ty) -> Self {
                    StructuralValue::Scalar(AnyBase::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str);

/// JSON-like rendering used in diagnostics.
impl fmt::Display for StructuralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralValue::Null => f.write_str("null"),
            StructuralValue::Scalar(AnyBase::String(s)) => write!(f, "{s:?}"),
            StructuralValue::Scalar(v) => write!(f, "{v}"),
            StructuralValue::Object(items) | StructuralValue::List(items) => {
                let (open, close) = match self {
                    StructuralValue::Object(_) => ('{', '}'),
                    _ => ('[', ']'),
                };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

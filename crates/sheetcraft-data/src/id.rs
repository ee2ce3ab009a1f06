use serde::{Deserialize, Serialize};
use sheetcraft_core::AnyBase;
use std::fmt;

/// Primary key of a row. A table's `Id` kind is fixed, so one table never
/// mixes numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowId {
    Int(i64),
    UInt(u64),
    Str(String),
}

impl RowId {
    /// Extract an id from a parsed `Id` cell. Null, floats, booleans and the
    /// empty string are not ids.
    pub fn from_value(value: &AnyBase) -> Option<Self> {
        match value {
            AnyBase::Int8(_) | AnyBase::Int16(_) | AnyBase::Int32(_) | AnyBase::Int64(_) => {
                Some(RowId::Int(value.as_i64()))
            }
            AnyBase::UInt8(_) | AnyBase::UInt16(_) | AnyBase::UInt32(_) | AnyBase::UInt64(_) => {
                Some(RowId::UInt(value.as_u64()))
            }
            AnyBase::String(s) if !s.is_empty() => Some(RowId::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(v) => write!(f, "{v}"),
            RowId::UInt(v) => write!(f, "{v}"),
            RowId::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// The sheet a contribution came from. Orders by file, then sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SheetOrigin {
    pub file: String,
    pub sheet: String,
}

impl SheetOrigin {
    pub fn new(file: &str, sheet: &str) -> Self {
        Self {
            file: file.to_string(),
            sheet: sheet.to_string(),
        }
    }
}

impl fmt::Display for SheetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.file, self.sheet)
    }
}

/// Where a field (or global entry) was declared. The smallest site across
/// all sheets fixes the field's declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldSite {
    pub origin: SheetOrigin,
    /// Column for header fields, row for global entries.
    pub position: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_from_values() {
        assert_eq!(RowId::from_value(&AnyBase::Int16(-4)), Some(RowId::Int(-4)));
        assert_eq!(RowId::from_value(&AnyBase::UInt8(9)), Some(RowId::UInt(9)));
        assert_eq!(
            RowId::from_value(&AnyBase::from("sword")),
            Some(RowId::Str("sword".into()))
        );
        assert_eq!(RowId::from_value(&AnyBase::from("")), None);
        assert_eq!(RowId::from_value(&AnyBase::Null), None);
        assert_eq!(RowId::from_value(&AnyBase::Float32(1.0)), None);
    }

    #[test]
    fn origins_order_by_file_then_sheet() {
        let a = SheetOrigin::new("a.xlsx", "z");
        let b = SheetOrigin::new("b.xlsx", "a");
        assert!(a < b);
        let site_a = FieldSite {
            origin: b.clone(),
            position: 0,
        };
        let site_b = FieldSite {
            origin: b,
            position: 3,
        };
        assert!(site_a < site_b);
    }

    #[test]
    fn display() {
        assert_eq!(RowId::Int(7).to_string(), "7");
        assert_eq!(RowId::Str("a".into()).to_string(), "\"a\"");
        assert_eq!(SheetOrigin::new("Item.xlsx", "<Item>").to_string(), "Item.xlsx[<Item>]");
    }
}

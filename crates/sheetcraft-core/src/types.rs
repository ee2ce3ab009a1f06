//! Canonical type model for declared spreadsheet columns.
//!
//! A [`TypeInfo`] is built once per declared field by the type grammar and
//! never mutated afterwards. Independently parsed declarations are compared
//! through their [`TypeIdentity`], a canonical string derived purely from the
//! type's shape.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GrammarError;

/// Maximum number of fields a custom type may declare.
pub const MAX_FIELDS: usize = 16;

/// Separates the shape part of an identity string from its field-name suffix.
/// Field names may never contain it.
pub const IDENTITY_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The primitive (or custom) kind of a value. Variant order is the layout
/// order used when sorting fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaseKind {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Link,
    Enum,
    Custom,
}

/// Built-in type keywords, matched case-insensitively. The first entry for a
/// kind is its canonical spelling.
pub const KEYWORDS: &[(&str, BaseKind)] = &[
    ("bool", BaseKind::Bool),
    ("boolean", BaseKind::Bool),
    ("int8", BaseKind::Int8),
    ("sbyte", BaseKind::Int8),
    ("i8", BaseKind::Int8),
    ("int16", BaseKind::Int16),
    ("short", BaseKind::Int16),
    ("i16", BaseKind::Int16),
    ("int32", BaseKind::Int32),
    ("int", BaseKind::Int32),
    ("i32", BaseKind::Int32),
    ("int64", BaseKind::Int64),
    ("long", BaseKind::Int64),
    ("i64", BaseKind::Int64),
    ("uint8", BaseKind::UInt8),
    ("byte", BaseKind::UInt8),
    ("u8", BaseKind::UInt8),
    ("uint16", BaseKind::UInt16),
    ("ushort", BaseKind::UInt16),
    ("u16", BaseKind::UInt16),
    ("uint32", BaseKind::UInt32),
    ("uint", BaseKind::UInt32),
    ("u32", BaseKind::UInt32),
    ("uint64", BaseKind::UInt64),
    ("ulong", BaseKind::UInt64),
    ("u64", BaseKind::UInt64),
    ("float32", BaseKind::Float32),
    ("float", BaseKind::Float32),
    ("f32", BaseKind::Float32),
    ("float64", BaseKind::Float64),
    ("double", BaseKind::Float64),
    ("f64", BaseKind::Float64),
    ("string", BaseKind::String),
    ("str", BaseKind::String),
    ("link", BaseKind::Link),
    ("enum", BaseKind::Enum),
];

impl BaseKind {
    /// Resolve a built-in keyword. Returns `None` for custom aliases.
    pub fn from_keyword(name: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(name))
            .map(|&(_, kind)| kind)
    }

    /// Canonical keyword used when rendering a type back to grammar text.
    pub fn keyword(self) -> &'static str {
        match self {
            BaseKind::Null => "null",
            BaseKind::Custom => "",
            kind => KEYWORDS
                .iter()
                .find(|&&(_, k)| k == kind)
                .map(|&(keyword, _)| keyword)
                .unwrap_or(""),
        }
    }

    /// Short letter code used in identity strings.
    pub fn code(self) -> &'static str {
        match self {
            BaseKind::Null => "n",
            BaseKind::Bool => "b",
            BaseKind::Int8 => "i1",
            BaseKind::Int16 => "i2",
            BaseKind::Int32 => "i4",
            BaseKind::Int64 => "i8",
            BaseKind::UInt8 => "u1",
            BaseKind::UInt16 => "u2",
            BaseKind::UInt32 => "u4",
            BaseKind::UInt64 => "u8",
            BaseKind::Float32 => "f4",
            BaseKind::Float64 => "f8",
            BaseKind::String => "s",
            BaseKind::Link => "l",
            BaseKind::Enum => "e",
            BaseKind::Custom => "x",
        }
    }

    /// Nullability a declaration gets when it carries no `?`/`!` flag.
    pub fn default_nullable(self) -> bool {
        matches!(
            self,
            BaseKind::String | BaseKind::Enum | BaseKind::Link | BaseKind::Custom
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseKind::Int8
                | BaseKind::Int16
                | BaseKind::Int32
                | BaseKind::Int64
                | BaseKind::UInt8
                | BaseKind::UInt16
                | BaseKind::UInt32
                | BaseKind::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BaseKind::Float32 | BaseKind::Float64)
    }

    /// Kinds usable as a row primary key.
    pub fn is_id_capable(self) -> bool {
        self.is_integer() || self == BaseKind::String
    }

    /// Kinds a composite field or dictionary key may have.
    pub fn is_base(self) -> bool {
        !matches!(self, BaseKind::Null | BaseKind::Custom)
    }
}

/// How values of a type are grouped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    #[default]
    None,
    Array,
    Dictionary,
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// One named field of a custom type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Declaration position, used for positional output.
    pub order: u8,
    pub name: String,
    pub kind: BaseKind,
    pub nullable: bool,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Canonical shape key of a [`TypeInfo`]. Two declarations with equal
/// identities describe the same type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeIdentity(pub String);

impl TypeIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn mark(nullable: bool) -> char {
    if nullable { '?' } else { '!' }
}

// ---------------------------------------------------------------------------
// TypeInfo
// ---------------------------------------------------------------------------

/// A declared column type.
///
/// `kind` is the element kind: for containers it describes each element, for
/// plain types the value itself. `nullable` is the type-level flag,
/// `value_nullable` the element-level flag of arrays and dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub kind: BaseKind,
    pub container: ContainerKind,
    /// `Int32` for arrays, the author's key kind for dictionaries, `Null`
    /// otherwise.
    pub key_kind: BaseKind,
    pub nullable: bool,
    pub value_nullable: bool,
    pub alias: Option<String>,
    /// Verbatim `<...>` annotation, e.g. the enum name of `enum<Quality>`.
    pub attribute: Option<String>,
    /// Sorted by `(kind, name)`.
    fields: Vec<FieldInfo>,
}

impl TypeInfo {
    /// A plain value of a built-in kind with the kind's default nullability.
    pub fn scalar(kind: BaseKind) -> Self {
        Self {
            kind,
            container: ContainerKind::None,
            key_kind: BaseKind::Null,
            nullable: kind.default_nullable(),
            value_nullable: false,
            alias: None,
            attribute: None,
            fields: Vec::new(),
        }
    }

    /// A custom type, named or anonymous. Fields are added afterwards.
    pub fn custom(alias: Option<&str>) -> Self {
        Self {
            alias: alias.map(str::to_string),
            ..Self::scalar(BaseKind::Custom)
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Wrap the type into an array. The current type-level flag becomes the
    /// element flag; the array itself is non-nullable.
    pub fn into_array(mut self) -> Self {
        self.value_nullable = self.nullable;
        self.nullable = false;
        self.container = ContainerKind::Array;
        self.key_kind = BaseKind::Int32;
        self
    }

    /// Wrap the type into a dictionary keyed by `key_kind`.
    pub fn into_dictionary(mut self, key_kind: BaseKind) -> Result<Self, GrammarError> {
        if !key_kind.is_base() {
            return Err(GrammarError::KindNotAllowed {
                kind: key_kind,
                position: "a dictionary key",
            });
        }
        self.value_nullable = self.nullable;
        self.nullable = false;
        self.container = ContainerKind::Dictionary;
        self.key_kind = key_kind;
        Ok(self)
    }

    /// Append a field in declaration order. Storage stays sorted by
    /// `(kind, name)`.
    pub fn add_field(
        &mut self,
        name: &str,
        kind: BaseKind,
        nullable: bool,
    ) -> Result<(), GrammarError> {
        if self.kind != BaseKind::Custom {
            return Err(GrammarError::FieldsOnBuiltin {
                name: self.kind.keyword().to_string(),
            });
        }
        if !kind.is_base() {
            return Err(GrammarError::KindNotAllowed {
                kind,
                position: "a field type",
            });
        }
        if name.is_empty() || name.contains(IDENTITY_SEPARATOR) {
            return Err(GrammarError::InvalidFieldName {
                name: name.to_string(),
            });
        }
        if self.fields.iter().any(|f| f.name == name) {
            return Err(GrammarError::DuplicateField {
                name: name.to_string(),
            });
        }
        if self.fields.len() >= MAX_FIELDS {
            return Err(GrammarError::TooManyFields);
        }

        let field = FieldInfo {
            order: self.fields.len() as u8,
            name: name.to_string(),
            kind,
            nullable,
        };
        let at = self
            .fields
            .partition_point(|f| (f.kind, f.name.as_str()) < (kind, name));
        self.fields.insert(at, field);
        Ok(())
    }

    /// Check the custom-type invariant.
    pub fn validate(&self) -> Result<(), GrammarError> {
        let has_alias = self.alias.as_deref().is_some_and(|a| !a.is_empty());
        if self.kind == BaseKind::Custom && !has_alias && self.fields.is_empty() {
            return Err(GrammarError::EmptyCustom);
        }
        Ok(())
    }

    /// Fields in layout order, sorted by `(kind, name)`.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Fields in declaration order.
    pub fn fields_in_order(&self) -> Vec<&FieldInfo> {
        let mut ordered: Vec<&FieldInfo> = self.fields.iter().collect();
        ordered.sort_by_key(|f| f.order);
        ordered
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_custom(&self) -> bool {
        self.kind == BaseKind::Custom
    }

    pub fn is_container(&self) -> bool {
        self.container != ContainerKind::None
    }

    /// Nullability of a single element: the element flag for containers,
    /// the type flag otherwise.
    pub fn element_nullable(&self) -> bool {
        if self.is_container() {
            self.value_nullable
        } else {
            self.nullable
        }
    }

    /// The element type on its own, with the element's nullability.
    pub fn element_type(&self) -> TypeInfo {
        TypeInfo {
            container: ContainerKind::None,
            key_kind: BaseKind::Null,
            nullable: self.element_nullable(),
            value_nullable: false,
            ..self.clone()
        }
    }

    /// Derive the canonical identity string.
    pub fn identity(&self) -> TypeIdentity {
        let mut element = match self.kind {
            BaseKind::Custom => {
                let codes: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| format!("{}{}", f.kind.code(), mark(f.nullable)))
                    .collect();
                format!(
                    "x{}{{{}}}",
                    self.alias.as_deref().unwrap_or(""),
                    codes.join(",")
                )
            }
            kind => kind.code().to_string(),
        };
        element.push(mark(self.element_nullable()));

        let mut id = match self.container {
            ContainerKind::None => element,
            ContainerKind::Array => format!("[{element}]{}", mark(self.nullable)),
            ContainerKind::Dictionary => format!(
                "[{}:{element}]{}",
                self.key_kind.code(),
                mark(self.nullable)
            ),
        };

        if !self.fields.is_empty() {
            id.push(IDENTITY_SEPARATOR);
            let names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            id.push_str(&names.join(","));
        }
        TypeIdentity(id)
    }

    /// Structural equality with forward references: two custom types with
    /// the same alias and shape match when either side declares no fields.
    pub fn is_compatible(&self, other: &TypeInfo) -> bool {
        if self.identity() == other.identity() {
            return true;
        }
        self.kind == BaseKind::Custom
            && other.kind == BaseKind::Custom
            && self.container == other.container
            && self.key_kind == other.key_kind
            && self.nullable == other.nullable
            && self.element_nullable() == other.element_nullable()
            && self.alias.is_some()
            && self.alias == other.alias
            && (self.fields.is_empty() || other.fields.is_empty())
    }
}

/// Renders grammar text with explicit flags, so parsing the output yields
/// the same identity.
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == BaseKind::Custom {
            if let Some(alias) = &self.alias {
                f.write_str(alias)?;
            }
            if !self.fields.is_empty() {
                f.write_str("{")?;
                for (i, field) in self.fields_in_order().into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(
                        f,
                        "{}{} {}",
                        field.kind.keyword(),
                        mark(field.nullable),
                        field.name
                    )?;
                }
                f.write_str("}")?;
            }
        } else {
            f.write_str(self.kind.keyword())?;
        }

        if let Some(attribute) = &self.attribute {
            write!(f, "<{attribute}>")?;
        }

        match self.container {
            ContainerKind::None => write!(f, "{}", mark(self.nullable)),
            ContainerKind::Array => write!(
                f,
                "{}[]{}",
                mark(self.value_nullable),
                mark(self.nullable)
            ),
            ContainerKind::Dictionary => write!(
                f,
                "{}[{}]{}",
                mark(self.value_nullable),
                self.key_kind.keyword(),
                mark(self.nullable)
            ),
        }
    }
}

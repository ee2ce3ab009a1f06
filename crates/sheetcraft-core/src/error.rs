use crate::types::{BaseKind, MAX_FIELDS};

/// Errors raised while turning a type annotation into a [`TypeInfo`].
///
/// [`TypeInfo`]: crate::types::TypeInfo
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    /// The annotation was blank.
    #[error("empty type annotation")]
    Empty,

    /// The annotation did not match the grammar at `offset`.
    #[error("expected {expected} at offset {offset}, found {found}")]
    Syntax {
        offset: usize,
        expected: &'static str,
        found: String,
    },

    /// A complete type was read but text remained after it.
    #[error("unexpected trailing input '{rest}' at offset {offset}")]
    Trailing { offset: usize, rest: String },

    /// A dictionary key named something other than a built-in base type.
    #[error("dictionary key '{name}' is not a built-in base type")]
    InvalidKeyKind { name: String },

    /// A built-in type carried a `{...}` field block.
    #[error("built-in type '{name}' cannot declare fields")]
    FieldsOnBuiltin { name: String },

    /// A custom type declared neither an alias nor any field.
    #[error("custom type needs an alias or at least one field")]
    EmptyCustom,

    /// More than [`MAX_FIELDS`] fields were declared.
    #[error("too many fields: at most {MAX_FIELDS} are allowed")]
    TooManyFields,

    /// The same field name appeared twice in one field block.
    #[error("field '{name}' declared more than once")]
    DuplicateField { name: String },

    /// A field's type was not a built-in base kind.
    #[error("field '{field}' has non-base type '{kind}'")]
    NonBaseField { field: String, kind: String },

    /// A field name was empty or contained the identity separator.
    #[error("invalid field name '{name}'")]
    InvalidFieldName { name: String },

    /// A builder call used a kind that cannot appear in that position.
    #[error("{kind:?} cannot be used as {position}")]
    KindNotAllowed {
        kind: BaseKind,
        position: &'static str,
    },
}

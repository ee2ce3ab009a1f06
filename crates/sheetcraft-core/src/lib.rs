//! Sheetcraft Core -- the type and value grammars behind the sheet importer.
//!
//! Designers annotate each spreadsheet column with a short type expression
//! and then fill its cells with free-form text. This crate turns both into
//! structured data:
//!
//! 1. **Type grammar** -- [`type_parser::parse_type`] reads an annotation such
//!    as `Reward{int32 id, int16 count}[]` into a [`types::TypeInfo`].
//! 2. **Value grammar** -- [`value_parser::parse_value`] reads a cell's text
//!    against that `TypeInfo` and yields a [`structural::StructuralValue`].
//!
//! Both grammars are lenient in the same places designers are sloppy:
//! keywords are case-insensitive, full-width punctuation is accepted, and
//! cells never fail outright. A cell that only partly parses still produces
//! a value and reports the unparsed span.
//!
//! # Key Types
//!
//! - [`types::TypeInfo`] -- A resolved column type with its stable
//!   [`types::TypeIdentity`].
//! - [`value::AnyBase`] -- One scalar of any base kind, or null.
//! - [`structural::StructuralValue`] -- Nested Null / Scalar / Object / List
//!   value handed to emitters.
//! - [`error::GrammarError`] -- Why an annotation was rejected.

pub mod error;
pub mod structural;
pub mod type_parser;
pub mod types;
pub mod value;
pub mod value_parser;

pub use error::GrammarError;
pub use structural::StructuralValue;
pub use type_parser::parse_type;
pub use types::{BaseKind, ContainerKind, FieldInfo, TypeIdentity, TypeInfo, MAX_FIELDS};
pub use value::AnyBase;
pub use value_parser::{default_value, parse_value, LinkRef, ParsedCell, ValueGroup};

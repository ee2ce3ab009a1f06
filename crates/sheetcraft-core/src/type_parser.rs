//! Type annotation grammar.
//!
//! ```text
//! type           := identifier? fieldBlock? attrBlock? flags? containerBlock? flags?
//! fieldBlock     := '{' field (',' field)* '}'
//! field          := identifier flags? identifier
//! attrBlock      := '<' freeform '>'
//! flags          := ('?' | '!')+
//! containerBlock := '[' identifier? ']'
//! ```
//!
//! Parsing happens in two passes: nom combinators recognise the raw shape,
//! then [`resolve`] turns it into a [`TypeInfo`] and applies the semantic
//! rules (keyword lookup, field limits, dictionary key kinds).

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till},
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of},
    combinator::{cut, opt, recognize},
    error::{VerboseError, VerboseErrorKind, context},
    multi::{many0_count, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};

use crate::error::GrammarError;
use crate::types::{BaseKind, TypeInfo};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// Public API
// ============================================================================

/// Parse a type annotation such as `int32?[string]` or `{int32 a, float b}[]!`.
pub fn parse_type(text: &str) -> Result<TypeInfo, GrammarError> {
    if text.trim().is_empty() {
        return Err(GrammarError::Empty);
    }

    let (rest, raw) = match raw_type(text) {
        Ok(parsed) => parsed,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(syntax_error(text, e));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(GrammarError::Syntax {
                offset: text.len(),
                expected: "more input",
                found: "end of input".to_string(),
            });
        }
    };

    if raw.name.is_none() && raw.fields.is_none() {
        let offset = text.len() - text.trim_start().len();
        return Err(GrammarError::Syntax {
            offset,
            expected: "type name or field block",
            found: describe(&text[offset..]),
        });
    }
    if !rest.is_empty() {
        return Err(GrammarError::Trailing {
            offset: text.len() - rest.len(),
            rest: rest.to_string(),
        });
    }

    resolve(raw)
}

// ============================================================================
// Raw syntax
// ============================================================================

#[derive(Debug)]
struct RawField<'a> {
    kind: &'a str,
    nullable: Option<bool>,
    name: &'a str,
}

#[derive(Debug)]
struct RawType<'a> {
    name: Option<&'a str>,
    fields: Option<Vec<RawField<'a>>>,
    attribute: Option<&'a str>,
    inner_flag: Option<bool>,
    /// `Some(None)` for `[]`, `Some(Some(key))` for `[key]`.
    container: Option<Option<&'a str>>,
    outer_flag: Option<bool>,
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// A run of `?`/`!` marks; the last one decides.
fn flags(input: &str) -> PResult<'_, bool> {
    let (input, marks) = many1(one_of("?!"))(input)?;
    Ok((input, marks.last() == Some(&'?')))
}

fn field(input: &str) -> PResult<'_, RawField<'_>> {
    let (input, kind) = ws(context("field type", identifier))(input)?;
    let (input, nullable) = opt(ws(flags))(input)?;
    let (input, name) = ws(context("field name", identifier))(input)?;
    Ok((
        input,
        RawField {
            kind,
            nullable,
            name,
        },
    ))
}

fn field_block(input: &str) -> PResult<'_, Vec<RawField<'_>>> {
    preceded(
        char('{'),
        cut(terminated(
            separated_list1(char(','), cut(field)),
            context("'}'", char('}')),
        )),
    )(input)
}

fn attribute(input: &str) -> PResult<'_, &str> {
    preceded(
        char('<'),
        cut(terminated(take_till(|c| c == '>'), context("'>'", char('>')))),
    )(input)
}

fn container_block(input: &str) -> PResult<'_, Option<&str>> {
    preceded(
        char('['),
        cut(terminated(ws(opt(identifier)), context("']'", char(']')))),
    )(input)
}

fn raw_type(input: &str) -> PResult<'_, RawType<'_>> {
    let (input, name) = ws(opt(identifier))(input)?;
    let (input, fields) = ws(opt(field_block))(input)?;
    let (input, attribute) = ws(opt(attribute))(input)?;
    let (input, inner_flag) = ws(opt(flags))(input)?;
    let (input, container) = ws(opt(container_block))(input)?;
    let (input, outer_flag) = ws(opt(flags))(input)?;
    Ok((
        input,
        RawType {
            name,
            fields,
            attribute,
            inner_flag,
            container,
            outer_flag,
        },
    ))
}

// ============================================================================
// Resolution
// ============================================================================

fn resolve(raw: RawType<'_>) -> Result<TypeInfo, GrammarError> {
    let builtin = raw.name.and_then(BaseKind::from_keyword);

    let mut info = match (builtin, raw.name) {
        (Some(kind), Some(name)) => {
            if raw.fields.is_some() {
                return Err(GrammarError::FieldsOnBuiltin {
                    name: name.to_string(),
                });
            }
            TypeInfo::scalar(kind)
        }
        _ => TypeInfo::custom(raw.name),
    };

    for field in raw.fields.unwrap_or_default() {
        let kind = BaseKind::from_keyword(field.kind).ok_or_else(|| GrammarError::NonBaseField {
            field: field.name.to_string(),
            kind: field.kind.to_string(),
        })?;
        let nullable = field.nullable.unwrap_or(kind.default_nullable());
        info.add_field(field.name, kind, nullable)?;
    }

    info.attribute = raw.attribute.map(str::to_string);
    if let Some(flag) = raw.inner_flag {
        info.nullable = flag;
    }

    if let Some(key) = raw.container {
        info = match key {
            None => info.into_array(),
            Some(key_name) => {
                let key_kind = BaseKind::from_keyword(key_name).ok_or_else(|| {
                    GrammarError::InvalidKeyKind {
                        name: key_name.to_string(),
                    }
                })?;
                info.into_dictionary(key_kind)?
            }
        };
    }
    if let Some(flag) = raw.outer_flag {
        info.nullable = flag;
    }

    info.validate()?;
    Ok(info)
}

// ============================================================================
// Error mapping
// ============================================================================

fn describe(rest: &str) -> String {
    match rest.chars().next() {
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}

fn syntax_error(text: &str, err: VerboseError<&str>) -> GrammarError {
    let offset = err
        .errors
        .first()
        .map(|(rest, _)| text.len() - rest.len())
        .unwrap_or(0);
    let expected = err
        .errors
        .iter()
        .find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(label) => Some(*label),
            _ => None,
        })
        .unwrap_or("type expression");
    GrammarError::Syntax {
        offset,
        expected,
        found: describe(&text[offset..]),
    }
}

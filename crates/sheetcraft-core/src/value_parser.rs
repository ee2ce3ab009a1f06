//! Cell value grammar.
//!
//! Reads one cell's text against an already resolved [`TypeInfo`]. Parsing
//! never fails: malformed or short content degrades to nulls and defaults,
//! and the unparsed span is reported through [`ParsedCell::leftover`] so the
//! caller can flag the cell.
//!
//! Delimiters accept their full-width forms as well:
//!
//! | char | role |
//! |------|------|
//! | `\|` `｜` | separates array / dictionary elements |
//! | `,` `，` | separates fields of a composite |
//! | `:` `：` | separates a dictionary key from its value |
//!
//! Quoted tokens (`"…"`, `'…'`, `＂…＂`, `“…”`, `‘…’`) may contain any
//! delimiter and support backslash escapes.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    error::{Error, ErrorKind, ParseError},
    sequence::pair,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::structural::StructuralValue;
use crate::types::{BaseKind, ContainerKind, FieldInfo, TypeInfo};
use crate::value::{AnyBase, parse_bool_word};

type PResult<'a, T> = IResult<&'a str, T, Error<&'a str>>;

// ============================================================================
// Public API
// ============================================================================

/// Result of parsing one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCell<'a> {
    pub value: StructuralValue,
    /// First span that could not be parsed. Empty on a clean parse.
    pub leftover: &'a str,
}

impl ParsedCell<'_> {
    pub fn is_clean(&self) -> bool {
        self.leftover.is_empty()
    }
}

/// Parsed-but-unprojected content of one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueGroup {
    /// One slot per composite field in declaration order, or a single slot.
    pub slots: Vec<AnyBase>,
    pub is_null: bool,
    /// Dictionary key, when parsed inside a dictionary.
    pub key: Option<AnyBase>,
}

impl ValueGroup {
    fn null() -> Self {
        Self {
            is_null: true,
            ..Self::default()
        }
    }

    fn with_slots(slots: Vec<AnyBase>) -> Self {
        Self {
            slots,
            ..Self::default()
        }
    }
}

/// Parse `text` as a value of type `ty`.
pub fn parse_value<'a>(text: &'a str, ty: &TypeInfo) -> ParsedCell<'a> {
    let parser = CellParser::new(ty);
    match ty.container {
        ContainerKind::None => parser.parse_single(text),
        ContainerKind::Array | ContainerKind::Dictionary => parser.parse_container(text),
    }
}

/// The value an empty cell of type `ty` takes.
pub fn default_value(ty: &TypeInfo) -> StructuralValue {
    parse_value("", ty).value
}

// ============================================================================
// Delimiters
// ============================================================================

fn is_element_sep(c: char) -> bool {
    matches!(c, '|' | '｜')
}

fn is_field_sep(c: char) -> bool {
    matches!(c, ',' | '，')
}

fn is_key_sep(c: char) -> bool {
    matches!(c, ':' | '：')
}

fn is_delimiter(c: char) -> bool {
    is_element_sep(c) || is_field_sep(c) || is_key_sep(c)
}

fn closing_quote(open: char) -> Option<char> {
    match open {
        '"' => Some('"'),
        '\'' => Some('\''),
        '＂' => Some('＂'),
        '“' => Some('”'),
        '‘' => Some('’'),
        _ => None,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Delimiters that end an unquoted token in the current context.
#[derive(Debug, Clone, Copy)]
struct Stops {
    element: bool,
    field: bool,
}

impl Stops {
    const NONE: Stops = Stops {
        element: false,
        field: false,
    };

    fn hits(self, c: char) -> bool {
        (self.element && is_element_sep(c)) || (self.field && is_field_sep(c))
    }
}

fn skip_blank(input: &str) -> &str {
    input.trim_start()
}

fn strip_element_sep(input: &str) -> Option<&str> {
    let c = input.chars().next()?;
    is_element_sep(c).then(|| &input[c.len_utf8()..])
}

/// Find the first char matching `stop` outside a quoted token.
fn find_unquoted(input: &str, stop: impl Fn(char) -> bool) -> Option<(usize, char)> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut token_start = true;

    for (i, c) in input.char_indices() {
        if let Some(close) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == close {
                quote = None;
            }
            continue;
        }
        if stop(c) {
            return Some((i, c));
        }
        if token_start && let Some(close) = closing_quote(c) {
            quote = Some(close);
            token_start = false;
            continue;
        }
        if is_delimiter(c) {
            token_start = true;
        } else if !c.is_whitespace() {
            token_start = false;
        }
    }
    None
}

/// Split off `key:` at the start of a dictionary element.
fn split_key(input: &str) -> Option<(&str, &str)> {
    match find_unquoted(input, |c| is_key_sep(c) || is_element_sep(c)) {
        Some((i, c)) if is_key_sep(c) => Some((&input[..i], &input[i + c.len_utf8()..])),
        _ => None,
    }
}

/// Skip past the next element separator. Returns the skipped span and the
/// input after the separator.
fn resync(input: &str) -> (&str, &str) {
    match find_unquoted(input, is_element_sep) {
        Some((i, c)) => (input[..i].trim_end(), skip_blank(&input[i + c.len_utf8()..])),
        None => (input.trim_end(), ""),
    }
}

// ============================================================================
// Token scanners
// ============================================================================

fn fail(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Error(Error::from_error_kind(input, ErrorKind::Verify))
}

fn number(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)
}

fn link(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(is_word_char),
        opt(pair(char('-'), take_while1(is_word_char))),
    ))(input)
}

fn enum_name(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| is_word_char(c) || c == '.')(input)
}

fn quoted(input: &str) -> PResult<'_, String> {
    let mut chars = input.char_indices();
    let Some(close) = chars.next().and_then(|(_, open)| closing_quote(open)) else {
        return Err(fail(input));
    };

    let mut text = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            text.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == close {
            return Ok((&input[i + c.len_utf8()..], text));
        } else {
            text.push(c);
        }
    }
    Err(fail(input))
}

fn parse_integral(token: &str) -> Option<i128> {
    match token.split_once('.') {
        None => token.parse::<i128>().ok(),
        Some((whole, fraction)) if fraction.chars().all(|c| c == '0') => match whole {
            "" | "+" | "-" => Some(0),
            whole => whole.parse::<i128>().ok(),
        },
        Some(_) => None,
    }
}

fn convert_number(token: &str, kind: BaseKind) -> Option<AnyBase> {
    let token = token.trim();
    match kind {
        BaseKind::Float32 => token.parse::<f32>().ok().map(AnyBase::Float32),
        BaseKind::Float64 => token.parse::<f64>().ok().map(AnyBase::Float64),
        _ => {
            let whole = parse_integral(token)?;
            match kind {
                BaseKind::Int8 => i8::try_from(whole).ok().map(AnyBase::Int8),
                BaseKind::Int16 => i16::try_from(whole).ok().map(AnyBase::Int16),
                BaseKind::Int32 => i32::try_from(whole).ok().map(AnyBase::Int32),
                BaseKind::Int64 => i64::try_from(whole).ok().map(AnyBase::Int64),
                BaseKind::UInt8 => u8::try_from(whole).ok().map(AnyBase::UInt8),
                BaseKind::UInt16 => u16::try_from(whole).ok().map(AnyBase::UInt16),
                BaseKind::UInt32 => u32::try_from(whole).ok().map(AnyBase::UInt32),
                BaseKind::UInt64 => u64::try_from(whole).ok().map(AnyBase::UInt64),
                _ => None,
            }
        }
    }
}

/// Convert the content of a quoted token.
fn convert_text(text: &str, kind: BaseKind) -> Option<AnyBase> {
    match kind {
        BaseKind::String | BaseKind::Enum => Some(AnyBase::String(text.to_string())),
        BaseKind::Link => all_consuming(link)(text.trim())
            .ok()
            .map(|(_, token)| AnyBase::from(token)),
        BaseKind::Bool => parse_bool_word(text).map(AnyBase::Bool),
        kind if kind.is_integer() || kind.is_float() => convert_number(text, kind),
        _ => None,
    }
}

/// Read one base-typed token. `Ok(None)` means the token was empty.
fn eat_base_value(input: &str, kind: BaseKind, stops: Stops) -> PResult<'_, Option<AnyBase>> {
    let input = skip_blank(input);
    match input.chars().next() {
        None => return Ok((input, None)),
        Some(c) if stops.hits(c) => return Ok((input, None)),
        Some(c) if closing_quote(c).is_some() => match quoted(input) {
            Ok((rest, text)) => {
                let value = convert_text(&text, kind).ok_or_else(|| fail(input))?;
                return Ok((skip_blank(rest), Some(value)));
            }
            // Unterminated: the quote is plain text.
            Err(_) if kind == BaseKind::String => {}
            Err(e) => return Err(e),
        },
        Some(_) => {}
    }

    let (rest, value) = match kind {
        BaseKind::Bool => {
            let (rest, word) =
                take_while1(|c: char| !c.is_whitespace() && !stops.hits(c))(input)?;
            (rest, parse_bool_word(word).map(AnyBase::Bool))
        }
        kind if kind.is_integer() || kind.is_float() => {
            let (rest, token) = number(input)?;
            (rest, convert_number(token, kind))
        }
        BaseKind::String => {
            let (rest, token) = take_while(|c: char| !stops.hits(c))(input)?;
            (rest, Some(AnyBase::from(token.trim_end())))
        }
        BaseKind::Link => {
            let (rest, token) = link(input)?;
            (rest, Some(AnyBase::from(token)))
        }
        BaseKind::Enum => {
            let (rest, token) = enum_name(input)?;
            (rest, Some(AnyBase::from(token)))
        }
        _ => (input, None),
    };

    let value = value.ok_or_else(|| fail(input))?;
    Ok((skip_blank(rest), Some(value)))
}

// ============================================================================
// Groups
// ============================================================================

fn field_default(field: &FieldInfo) -> AnyBase {
    if field.nullable {
        AnyBase::Null
    } else {
        AnyBase::default_for(field.kind)
    }
}

struct CellParser<'t> {
    ty: &'t TypeInfo,
    /// Composite fields in declaration order.
    fields: Vec<&'t FieldInfo>,
}

impl<'t> CellParser<'t> {
    fn new(ty: &'t TypeInfo) -> Self {
        Self {
            ty,
            fields: ty.fields_in_order(),
        }
    }

    fn default_group(&self, nullable: bool) -> ValueGroup {
        if nullable {
            return ValueGroup::null();
        }
        if self.ty.is_custom() {
            ValueGroup::with_slots(self.fields.iter().map(|f| field_default(f)).collect())
        } else {
            ValueGroup::with_slots(vec![AnyBase::default_for(self.ty.kind)])
        }
    }

    /// Read one element. On failure the returned input still starts at the
    /// offending token so the caller can report it.
    fn eat_value_group<'a>(
        &self,
        input: &'a str,
        nullable: bool,
        stops: Stops,
    ) -> (&'a str, ValueGroup) {
        let input = skip_blank(input);
        if self.ty.is_custom() {
            return self.eat_composite(input, nullable, stops);
        }
        match eat_base_value(input, self.ty.kind, stops) {
            Ok((rest, Some(value))) => (rest, ValueGroup::with_slots(vec![value])),
            Ok((rest, None)) => (rest, self.default_group(nullable)),
            Err(_) => (input, self.default_group(nullable)),
        }
    }

    fn eat_composite<'a>(
        &self,
        input: &'a str,
        nullable: bool,
        stops: Stops,
    ) -> (&'a str, ValueGroup) {
        let element_empty = match input.chars().next() {
            None => true,
            Some(c) => stops.element && is_element_sep(c),
        };
        if element_empty {
            return (input, self.default_group(nullable));
        }

        let mut slots: Vec<AnyBase> = self.fields.iter().map(|f| field_default(f)).collect();
        let mut rest = input;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                match rest.chars().next() {
                    Some(c) if is_field_sep(c) => rest = skip_blank(&rest[c.len_utf8()..]),
                    // Short input: remaining fields keep their defaults.
                    _ => break,
                }
            }
            match eat_base_value(rest, field.kind, stops) {
                Ok((next, Some(value))) => {
                    slots[i] = value;
                    rest = next;
                }
                Ok((next, None)) => rest = next,
                Err(_) => break,
            }
        }
        (rest, ValueGroup::with_slots(slots))
    }

    /// Read an optional `key:` prefix. Without one the key kind's default is
    /// used. `Err` carries the input where the key failed to parse.
    fn eat_key<'a>(&self, input: &'a str) -> Result<(&'a str, AnyBase), &'a str> {
        let key_kind = self.ty.key_kind;
        let Some((key_text, after)) = split_key(input) else {
            return Ok((input, AnyBase::default_for(key_kind)));
        };
        match eat_base_value(key_text, key_kind, Stops::NONE) {
            Ok((rest, key)) if rest.trim().is_empty() => Ok((
                skip_blank(after),
                key.unwrap_or_else(|| AnyBase::default_for(key_kind)),
            )),
            _ => Err(input),
        }
    }

    fn parse_single<'a>(&self, text: &'a str) -> ParsedCell<'a> {
        let stops = Stops {
            element: false,
            field: self.ty.is_custom(),
        };
        let (rest, group) = self.eat_value_group(text, self.ty.nullable, stops);
        ParsedCell {
            value: self.project(group),
            leftover: skip_blank(rest).trim_end(),
        }
    }

    fn parse_container<'a>(&self, text: &'a str) -> ParsedCell<'a> {
        let mut rest = skip_blank(text);
        if rest.is_empty() {
            let value = if self.ty.nullable {
                StructuralValue::Null
            } else {
                StructuralValue::List(Vec::new())
            };
            return ParsedCell {
                value,
                leftover: "",
            };
        }

        let stops = Stops {
            element: true,
            field: self.ty.is_custom(),
        };
        let dictionary = self.ty.container == ContainerKind::Dictionary;
        let mut groups = Vec::new();
        let mut leftover: Option<&'a str> = None;

        while !rest.is_empty() {
            if let Some(after) = strip_element_sep(rest) {
                // Holes are explicit nulls in arrays; dictionaries skip them.
                if !dictionary {
                    groups.push(ValueGroup::null());
                }
                rest = skip_blank(after);
                continue;
            }

            let entry = rest;
            let mut key = None;
            if dictionary {
                match self.eat_key(rest) {
                    Ok((after, parsed)) => {
                        key = Some(parsed);
                        rest = after;
                    }
                    Err(failed) => {
                        let (span, next) = resync(failed);
                        leftover.get_or_insert(span);
                        rest = next;
                        continue;
                    }
                }
            }

            let (after, mut group) = self.eat_value_group(rest, self.ty.value_nullable, stops);
            group.key = key;
            rest = skip_blank(after);

            if rest.is_empty() {
                groups.push(group);
                break;
            }
            match strip_element_sep(rest) {
                Some(after) => {
                    groups.push(group);
                    rest = skip_blank(after);
                }
                // Arrays keep the slot; a dictionary drops the whole entry.
                None if dictionary => {
                    let (span, next) = resync(entry);
                    leftover.get_or_insert(span);
                    rest = next;
                }
                None => {
                    groups.push(group);
                    let (span, next) = resync(rest);
                    leftover.get_or_insert(span);
                    rest = next;
                }
            }
        }

        ParsedCell {
            value: self.project_all(groups),
            leftover: leftover.unwrap_or(""),
        }
    }

    // ------------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------------

    fn project(&self, group: ValueGroup) -> StructuralValue {
        if group.is_null {
            return StructuralValue::Null;
        }
        if self.ty.is_custom() {
            StructuralValue::Object(group.slots.into_iter().map(StructuralValue::from).collect())
        } else {
            group
                .slots
                .into_iter()
                .next()
                .map(StructuralValue::from)
                .unwrap_or_default()
        }
    }

    fn project_all(&self, groups: Vec<ValueGroup>) -> StructuralValue {
        if self.ty.container != ContainerKind::Dictionary {
            return StructuralValue::List(groups.into_iter().map(|g| self.project(g)).collect());
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(groups.len() * 2);
        for mut group in groups {
            let key = group
                .key
                .take()
                .unwrap_or_else(|| AnyBase::default_for(self.ty.key_kind));
            if !seen.insert(key.clone()) {
                continue;
            }
            items.push(StructuralValue::from(key));
            items.push(self.project(group));
        }
        StructuralValue::List(items)
    }
}

// ============================================================================
// Links
// ============================================================================

/// A parsed `item[-table]` link value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRef {
    pub item: String,
    pub table: Option<String>,
}

impl LinkRef {
    pub fn parse(text: &str) -> Option<Self> {
        let (_, token) = all_consuming(link)(text.trim()).ok()?;
        let link = match token.split_once('-') {
            Some((item, table)) => LinkRef {
                item: item.to_string(),
                table: Some(table.to_string()),
            },
            None => LinkRef {
                item: token.to_string(),
                table: None,
            },
        };
        Some(link)
    }
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}-{}", self.item, table),
            None => f.write_str(&self.item),
        }
    }
}

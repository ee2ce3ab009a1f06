//! Property-based tests for the type and value grammars.
//!
//! Uses proptest to generate random type shapes and cell texts, then checks
//! that identities are stable and that cell parsing stays total.

use proptest::prelude::*;
use sheetcraft_core::{
    parse_type, parse_value, AnyBase, BaseKind, ContainerKind, StructuralValue, TypeInfo,
};
use std::collections::HashSet;

// ===========================================================================
// Generators
// ===========================================================================

const BASE_KINDS: &[BaseKind] = &[
    BaseKind::Bool,
    BaseKind::Int8,
    BaseKind::Int16,
    BaseKind::Int32,
    BaseKind::Int64,
    BaseKind::UInt8,
    BaseKind::UInt16,
    BaseKind::UInt32,
    BaseKind::UInt64,
    BaseKind::Float32,
    BaseKind::Float64,
    BaseKind::String,
    BaseKind::Link,
    BaseKind::Enum,
];

fn arb_base_kind() -> impl Strategy<Value = BaseKind> {
    prop::sample::select(BASE_KINDS)
}

/// Field declarations with unique names, in declaration order.
fn arb_fields() -> impl Strategy<Value = Vec<(String, BaseKind, bool)>> {
    prop::collection::btree_map("f_[a-z]{1,5}", (arb_base_kind(), any::<bool>()), 1..6)
        .prop_map(|fields| {
            fields
                .into_iter()
                .map(|(name, (kind, nullable))| (name, kind, nullable))
                .collect()
        })
        .prop_shuffle()
}

fn build_custom(
    alias: Option<&str>,
    fields: &[(String, BaseKind, bool)],
    nullable: bool,
) -> TypeInfo {
    let mut ty = TypeInfo::custom(alias).with_nullable(nullable);
    for (name, kind, field_nullable) in fields {
        ty.add_field(name, *kind, *field_nullable).unwrap();
    }
    ty
}

fn arb_element() -> impl Strategy<Value = TypeInfo> {
    prop_oneof![
        (arb_base_kind(), any::<bool>())
            .prop_map(|(kind, nullable)| TypeInfo::scalar(kind).with_nullable(nullable)),
        (prop::option::of("T[a-z]{1,6}"), arb_fields(), any::<bool>()).prop_map(
            |(alias, fields, nullable)| build_custom(alias.as_deref(), &fields, nullable)
        ),
    ]
}

fn arb_type() -> impl Strategy<Value = TypeInfo> {
    (arb_element(), 0..3u8, arb_base_kind(), any::<bool>()).prop_map(
        |(element, container, key, outer)| match container {
            0 => element,
            1 => element.into_array().with_nullable(outer),
            _ => element.into_dictionary(key).unwrap().with_nullable(outer),
        },
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Rendering a type and parsing it back yields the same identity.
    #[test]
    fn rendered_type_reparses_to_same_identity(ty in arb_type()) {
        let text = ty.to_string();
        let parsed = parse_type(&text).unwrap();
        prop_assert_eq!(parsed.identity(), ty.identity(), "text: {}", text);
    }

    /// Field declaration order never affects identity.
    #[test]
    fn identity_ignores_declaration_order(fields in arb_fields(), nullable in any::<bool>()) {
        let forward = build_custom(Some("Tshape"), &fields, nullable);
        let mut reversed_fields = fields.clone();
        reversed_fields.reverse();
        let reversed = build_custom(Some("Tshape"), &reversed_fields, nullable);
        prop_assert_eq!(forward.identity(), reversed.identity());
    }

    /// A bare alias is compatible with any fielded declaration of that alias.
    #[test]
    fn forward_reference_is_compatible(fields in arb_fields()) {
        let full = build_custom(Some("Tref"), &fields, true);
        let bare = TypeInfo::custom(Some("Tref"));
        prop_assert!(bare.is_compatible(&full));
        prop_assert!(full.is_compatible(&bare));
    }

    /// Cell parsing is total: any text yields a value and a leftover span
    /// taken from the input.
    #[test]
    fn cell_parsing_never_panics(ty in arb_type(), text in "[ -~|｜，：“”]{0,24}") {
        let cell = parse_value(&text, &ty);
        prop_assert!(text.contains(cell.leftover));
        if ty.container != ContainerKind::None && !cell.value.is_null() {
            prop_assert!(matches!(cell.value, StructuralValue::List(_)));
        }
    }

    /// Empty cells of non-nullable types never project to null.
    #[test]
    fn empty_non_nullable_is_never_null(ty in arb_type()) {
        let ty = ty.with_nullable(false);
        prop_assert!(!parse_value("", &ty).value.is_null());
    }

    /// Integer arrays keep every element, holes included.
    #[test]
    fn integer_array_keeps_holes(
        items in prop::collection::vec(prop::option::of(any::<i32>()), 1..8),
    ) {
        let text: Vec<String> = items
            .iter()
            .map(|item| item.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        let text = text.join("|");
        let ty = parse_type("int32[]").unwrap();
        let cell = parse_value(&text, &ty);
        prop_assert!(cell.is_clean());

        let mut expected: Vec<StructuralValue> = items
            .iter()
            .map(|item| item.map(StructuralValue::from).unwrap_or_default())
            .collect();
        // A final empty element is a trailing separator, not a hole.
        if items.len() > 1 && items.last() == Some(&None) {
            expected.pop();
        }
        if items == [None] {
            expected.clear();
        }
        prop_assert_eq!(cell.value, StructuralValue::List(expected));
    }

    /// Dictionary projections never repeat a key.
    #[test]
    fn dictionary_keys_are_unique(
        entries in prop::collection::vec((0..5i32, any::<i16>()), 0..10),
    ) {
        let text: Vec<String> = entries.iter().map(|(k, v)| format!("{k}:{v}")).collect();
        let ty = parse_type("int16[int32]").unwrap();
        let joined = text.join("|");
        let cell = parse_value(&joined, &ty);

        let items = cell.value.items().unwrap().to_vec();
        prop_assert_eq!(items.len() % 2, 0);
        let keys: Vec<AnyBase> = items
            .iter()
            .step_by(2)
            .filter_map(|k| k.as_scalar().cloned())
            .collect();
        let unique: HashSet<&AnyBase> = keys.iter().collect();
        prop_assert_eq!(unique.len(), keys.len());

        let distinct: HashSet<i32> = entries.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(keys.len(), distinct.len());
    }
}

// Property-based tests for parsing and NORMALIZED serialization.
//
// Sizes and depths stay small so the suite runs quickly.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;

use jcs_keygen::json::number::{format_f64, parse_lexical};
use jcs_keygen::json::{
    normalize, parse, serialize, JsonNumber, JsonObject, JsonValue, OutputFormat,
};

fn arb_name() -> impl Strategy<Value = String> {
    // Alphabetic names never trigger the numeric-name ordering rule.
    proptest::collection::vec(proptest::char::range('a', 'z'), 1..12)
        .prop_map(|chars| chars.into_iter().collect())
}

fn arb_text() -> impl Strategy<Value = String> {
    // Control characters, quotes and non-ASCII exercise the escape paths.
    proptest::collection::vec(
        prop_oneof![
            proptest::char::range(' ', '~'),
            proptest::char::range('\u{0}', '\u{1f}'),
            Just('"'),
            Just('\\'),
            proptest::char::range('\u{a0}', '\u{2fff}'),
            Just('\u{1F600}'),
        ],
        0..24,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn arb_finite() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("finite", |f| f.is_finite())
}

fn arb_leaf() -> impl Strategy<Value = JsonValue> {
    prop_oneof![
        (-(1i64 << 53) + 1..(1i64 << 53))
            .prop_map(|i| JsonValue::Number(JsonNumber::from_int53(i).unwrap())),
        arb_finite().prop_map(|f| JsonValue::Number(JsonNumber::from_f64(f).unwrap())),
        arb_text().prop_map(JsonValue::String),
        any::<bool>().prop_map(JsonValue::Bool),
        Just(JsonValue::Null),
    ]
}

fn arb_value() -> impl Strategy<Value = JsonValue> {
    arb_leaf().prop_recursive(4, 128, 8, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..8).prop_map(JsonValue::Array),
            proptest::collection::vec((arb_name(), inner), 0..8).prop_map(|pairs| {
                let mut object = JsonObject::new();
                for (name, value) in pairs {
                    if !object.contains(&name) {
                        object.set(name, value);
                    }
                }
                JsonValue::Object(object)
            }),
        ]
    })
}

fn arb_document() -> impl Strategy<Value = JsonValue> {
    prop_oneof![
        proptest::collection::vec(arb_value(), 0..6).prop_map(JsonValue::Array),
        proptest::collection::vec((arb_name(), arb_value()), 0..6).prop_map(|pairs| {
            let mut object = JsonObject::new();
            for (name, value) in pairs {
                if !object.contains(&name) {
                    object.set(name, value);
                }
            }
            JsonValue::Object(object)
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn normalized_output_reparses_to_same_value(doc in arb_document()) {
        let bytes = normalize(&doc).unwrap();
        let reparsed = parse(&bytes).unwrap();
        prop_assert_eq!(&reparsed, &doc);
        prop_assert_eq!(normalize(&reparsed).unwrap(), bytes);
    }

    #[test]
    fn normalization_is_deterministic(doc in arb_document()) {
        let first = normalize(&doc).unwrap();
        let second = normalize(&doc).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn pretty_output_normalizes_identically(doc in arb_document()) {
        let pretty = serialize(&doc, OutputFormat::Pretty).unwrap();
        let reparsed = parse(pretty.as_bytes()).unwrap();
        prop_assert_eq!(normalize(&reparsed).unwrap(), normalize(&doc).unwrap());
    }

    #[test]
    fn normalized_output_is_single_line(doc in arb_document()) {
        let text = serialize(&doc, OutputFormat::Normalized).unwrap();
        prop_assert!(!text.ends_with('\n'));
        prop_assert!(!text.contains('\n'));
    }

    #[test]
    fn number_format_round_trips_exactly(value in arb_finite()) {
        let text = format_f64(value).unwrap();
        let back = parse_lexical(&text).unwrap();
        prop_assert_eq!(back, value);
        // Re-formatting the parsed text is a fixed point.
        prop_assert_eq!(format_f64(back).unwrap(), text);
    }

    #[test]
    fn safe_integers_format_without_exponent(value in -(1i64 << 53) + 1..(1i64 << 53)) {
        let text = format_f64(value as f64).unwrap();
        prop_assert_eq!(text, value.to_string());
    }
}

//! Tests for contextfield-core: errors, shared types, text helpers

use contextfield_core::text::{estimate_tokens, jaccard, token_set};
use contextfield_core::*;

// ===========================================================================
// Error kinds
// ===========================================================================

#[test]
fn error_types_map_to_external_kinds() {
    assert_eq!(Error::parse("bad").error_type(), "ParseError");
    assert_eq!(Error::MissingSection("intent".into()).error_type(), "ParseError");
    assert_eq!(Error::MissingInputField("x".into()).error_type(), "MissingInputField");
    assert_eq!(Error::UnknownOperation("a.b".into()).error_type(), "UnknownOperation");
    assert_eq!(
        Error::operation_failure("field.tune", "boom").error_type(),
        "OperationFailure"
    );
    assert_eq!(
        Error::invalid_parameter("factor", "not a number").error_type(),
        "OperationFailure"
    );
    assert_eq!(Error::invalid_config("decay").error_type(), "InvalidConfiguration");
}

#[test]
fn error_display_includes_context() {
    let err = Error::operation_failure("resonance.scaffold", "no targets");
    assert_eq!(err.to_string(), "operation failed: resonance.scaffold - no targets");
    let err = Error::MissingSection("process".into());
    assert_eq!(err.to_string(), "missing required section: process");
}

#[test]
fn json_error_converts() {
    let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: Error = bad.unwrap_err().into();
    assert!(matches!(err, Error::JsonError(_)));
}

// ===========================================================================
// Location
// ===========================================================================

#[test]
fn location_is_clamped_to_unit_square() {
    let loc = Location::new(-3.0, 7.5);
    assert_eq!(loc, Location { x: 0.0, y: 1.0 });
}

#[test]
fn location_from_text_is_deterministic() {
    let a = Location::from_text("ownership and borrowing");
    let b = Location::from_text("ownership and borrowing");
    assert_eq!(a, b);
    assert!((0.0..=1.0).contains(&a.x));
    assert!((0.0..=1.0).contains(&a.y));
}

#[test]
fn location_from_text_is_pinned_across_builds() {
    // FNV-1a of the text: low 16 bits give x, the next 16 give y.
    let loc = Location::from_text("ownership and borrowing");
    assert!((loc.x - 63652.0 / 65535.0).abs() < 1e-12);
    assert!((loc.y - 43531.0 / 65535.0).abs() < 1e-12);
}

#[test]
fn quoted_param_values_are_unescaped() {
    assert_eq!(ParamValue::parse(r"'what\'s new'"), ParamValue::Str("what's new".into()));
    assert_eq!(ParamValue::parse(r#""say \"hi\"""#), ParamValue::Str("say \"hi\"".into()));
    assert_eq!(ParamValue::Str("it's".into()).to_string(), r"'it\'s'");
}

#[test]
fn location_distance() {
    let a = Location::new(0.0, 0.0);
    let b = Location::new(0.3, 0.4);
    assert!((a.distance(&b) - 0.5).abs() < 1e-9);
}

// ===========================================================================
// ParamValue
// ===========================================================================

#[test]
fn param_value_parses_literals() {
    assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
    assert_eq!(ParamValue::parse("42"), ParamValue::Int(42));
    assert_eq!(ParamValue::parse("0.25"), ParamValue::Float(0.25));
    assert_eq!(ParamValue::parse("'strength'"), ParamValue::Str("strength".into()));
    assert_eq!(ParamValue::parse("\"a b\""), ParamValue::Str("a b".into()));
    assert_eq!(ParamValue::parse("recursive"), ParamValue::Str("recursive".into()));
}

#[test]
fn param_value_accessors() {
    assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
    assert_eq!(ParamValue::Float(0.5).as_i64(), None);
    assert_eq!(ParamValue::Str("x".into()).as_str(), Some("x"));
    assert_eq!(ParamValue::Bool(false).as_bool(), Some(false));
}

#[test]
fn param_value_display_reparses() {
    for value in [
        ParamValue::Bool(true),
        ParamValue::Int(-4),
        ParamValue::Float(0.75),
        ParamValue::Float(2.0),
        ParamValue::Str("harmonic integration".into()),
        ParamValue::Str("what's new".into()),
        ParamValue::Str(r"C:\cache\dir".into()),
    ] {
        assert_eq!(ParamValue::parse(&value.to_string()), value);
    }
}

#[test]
fn lifecycle_serializes_lowercase() {
    let json = serde_json::to_string(&Lifecycle::Surfaced).unwrap();
    assert_eq!(json, "\"surfaced\"");
    assert_eq!(Lifecycle::Echo.to_string(), "echo");
}

// ===========================================================================
// Text helpers
// ===========================================================================

#[test]
fn token_set_lowercases_and_splits() {
    let tokens = token_set("Field-Store, field store!");
    assert_eq!(tokens.len(), 2);
    assert!(tokens.contains("field"));
    assert!(tokens.contains("store"));
}

#[test]
fn jaccard_is_symmetric() {
    let a = "attractor basin width";
    let b = "basin of the attractor";
    assert_eq!(jaccard(a, b), jaccard(b, a));
}

#[test]
fn estimate_tokens_is_quarter_of_length() {
    assert_eq!(estimate_tokens("abcdefgh"), 2);
}

#[test]
fn new_id_has_prefix_and_is_unique() {
    let a = new_id("attractor");
    let b = new_id("attractor");
    assert!(a.starts_with("attractor-"));
    assert_ne!(a, b);
}

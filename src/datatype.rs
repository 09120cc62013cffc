//! Data-type utilities (component B): parsing textual literals into typed
//! values, classifying primitive vs. object bindings, and primitive bit
//! sizes. `parse_enum_literal` is consumed by the configuration subsystem's
//! `|`-separated enum-default expansion (§4.7, `config::view_c`);
//! `parse_literal`/`PrimitiveKind`/`is_primitive_value` are the matching
//! literal-parsing and classification primitives a host-supplied
//! JSON/text schema loader would use for the same purpose.

use crate::value::Value;

/// The primitive wire kinds a scalar/array-of-scalar binding can name.
/// Mirrors the scalar half of §4.1's `Binding` kind list; `Object` fields
/// are deliberately excluded — `is_primitive` on [`PrimitiveKind`] callers
/// is how the compiler enforces "`BindArrayPrimitive.type` must be
/// primitive" (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Natural bit width for this kind when no explicit size expression is
    /// given.
    pub const fn default_bit_size(self) -> usize {
        match self {
            PrimitiveKind::Bool => 1,
            PrimitiveKind::Byte => 8,
            PrimitiveKind::Short => 16,
            PrimitiveKind::Int | PrimitiveKind::Float => 32,
            PrimitiveKind::Long | PrimitiveKind::Double => 64,
        }
    }

    pub const fn is_floating_point(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }
}

/// Parses a textual literal (as it would appear in a schema's `default`
/// attribute or a configuration override) into a [`Value`] for the given
/// primitive kind.
pub fn parse_literal(text: &str, kind: PrimitiveKind) -> Result<Value, String> {
    let trimmed = text.trim();
    match kind {
        PrimitiveKind::Bool => trimmed
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| e.to_string()),
        PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Int | PrimitiveKind::Long => {
            if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16).map(Value::I64).map_err(|e| e.to_string())
            } else {
                trimmed.parse::<i64>().map(Value::I64).map_err(|e| e.to_string())
            }
        }
        PrimitiveKind::Float => trimmed
            .parse::<f32>()
            .map(Value::F32)
            .map_err(|e| e.to_string()),
        PrimitiveKind::Double => trimmed
            .parse::<f64>()
            .map(Value::F64)
            .map_err(|e| e.to_string()),
    }
}

/// Parses a `|`-separated enumeration literal (§4.7 composite/enum default
/// expansion) into an array of string labels, or a single label if there is
/// no separator.
pub fn parse_enum_literal(text: &str) -> Value {
    if text.contains('|') {
        Value::Array(text.split('|').map(|s| Value::Str(s.trim().to_string())).collect())
    } else {
        Value::Str(text.trim().to_string())
    }
}

/// Whether a [`Value`] is "primitive" in the sense §4 uses the word for
/// default-value/validation rules (anything other than a nested object or
/// array-of-objects).
pub fn is_primitive_value(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex_ints() {
        assert_eq!(parse_literal("42", PrimitiveKind::Int), Ok(Value::I64(42)));
        assert_eq!(parse_literal("0x2A", PrimitiveKind::Int), Ok(Value::I64(42)));
    }

    #[test]
    fn parses_floats() {
        assert_eq!(parse_literal("1.5", PrimitiveKind::Float), Ok(Value::F32(1.5)));
    }

    #[test]
    fn parses_enum_literal_with_pipe_as_array() {
        assert_eq!(
            parse_enum_literal("A|B|C"),
            Value::Array(vec![
                Value::Str("A".into()),
                Value::Str("B".into()),
                Value::Str("C".into())
            ])
        );
        assert_eq!(parse_enum_literal("A"), Value::Str("A".into()));
    }

    #[test]
    fn classifies_primitive_values() {
        assert!(is_primitive_value(&Value::I64(1)));
        assert!(!is_primitive_value(&Value::Array(vec![])));
        assert!(!is_primitive_value(&Value::Object(Default::default())));
    }
}

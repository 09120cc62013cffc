//! The logical value model shared by the codec, evaluator, and configuration
//! subsystems.
//!
//! A decoded message is a [`Record`]: a named `BTreeMap<String, Value>`. This
//! generalizes the teacher crate's `Schema::parse`, which already returns a
//! `BTreeMap<String, crate::assembly::Value>` rather than a generated struct
//! — here that map gains a type name (needed for polymorphic object/array
//! variant resolution) and the `Value` enum grows to cover every wire kind
//! §4.1/§4.2 of the design name, not just integers.

use std::collections::BTreeMap;
use std::fmt;

/// A value flowing through the engine: either a primitive read off the wire,
/// a converted/validated logical value, or a nested [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Arbitrary-width integer, stored as a sign plus big-endian magnitude.
    BigInt(BigInt),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(Record),
    /// Absence of a value: what a skipped (condition-false) field leaves
    /// behind if read back before being assigned.
    Unset,
}

impl Value {
    /// Best-effort conversion to `i64`, used by the evaluator and by size
    /// expressions. Fails (`None`) for values with no sensible integer
    /// projection (e.g. `Bytes`, nested `Object`s).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            Value::F32(v) => Some(*v as i64),
            Value::F64(v) => Some(*v as i64),
            Value::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::BigInt(b) => b.to_i64().map(|v| v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I64(v) => Some(*v != 0),
            Value::U64(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::BigInt(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{b:02x?}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(r) => write!(f, "{r:?}"),
            Value::Unset => write!(f, "<unset>"),
        }
    }
}

/// An arbitrary-width signed integer: a sign flag plus a big-endian
/// magnitude, as produced by [`crate::bits::BitReader::read_big_int`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    pub negative: bool,
    /// Big-endian magnitude, no leading zero bytes beyond what the
    /// declared bit width requires.
    pub magnitude: Vec<u8>,
}

impl BigInt {
    pub fn from_i64(value: i64, byte_len: usize) -> Self {
        let negative = value < 0;
        let magnitude_value = value.unsigned_abs();
        let mut magnitude = vec![0u8; byte_len];
        for (i, byte) in magnitude.iter_mut().rev().enumerate() {
            *byte = ((magnitude_value >> (8 * i)) & 0xff) as u8;
        }
        BigInt { negative, magnitude }
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.magnitude.len() > 8 {
            return None;
        }
        let mut acc: u64 = 0;
        for byte in &self.magnitude {
            acc = (acc << 8) | *byte as u64;
        }
        if self.negative {
            let signed = -(acc as i64);
            Some(signed)
        } else {
            i64::try_from(acc).ok()
        }
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "0x")?;
        for byte in &self.magnitude {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A decoded (or to-be-encoded) message instance: a named bag of fields.
///
/// `type_name` identifies which concrete alternative was chosen when this
/// record was produced by a polymorphic `Object`/`Array` binding — needed on
/// the encode side to look the alternative back up by runtime type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub type_name: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Record {
            type_name: Some(type_name.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn anonymous() -> Self {
        Record::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Resolves a dotted path (`a.b.c`) against this record, descending
    /// through nested `Object` values.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.fields.get(segment)?;
        }
        Some(current)
    }
}

//! Codec registry and default codecs (component E). A [`Codec`] turns a
//! [`BindingSpec`] plus bits off (or onto) the wire into (or from) a
//! [`Value`] — every binding kind except `Object`/`ArrayObject`, which the
//! engine (component F) handles itself since polymorphic variant selection
//! needs a back-reference to the template registry a codec does not have.
//!
//! This splits the teacher's single `CompiledField::assemble`/`assemble_at`
//! (`crates/bitcraft/src/compiled.rs`), which switches on a flat
//! `CompiledFieldKind` to read one field, into a registry so a host can
//! swap in a codec for a kind without forking the engine — the design's
//! "codec dispatch" is the pluggable seam the teacher's single match
//! expression does not need to be, since the teacher's kind set is closed.

use std::collections::HashMap;

use crate::binding::{BindingSpec, Charset, Converter, DecimalClass, Validator};
use crate::bits::{BitReader, BitWriter, ByteOrder};
use crate::capabilities::{Checksummer, Crc16Ccitt, Sum16, Sum8, Xor8};
use crate::errors::{CodecError, EngineError};
use crate::evaluator::{EvalScope, Evaluator};
use crate::value::{BigInt, Value};

/// Reads/writes one binding kind's raw wire representation. Implementations
/// never apply a `Converter`/`Validator` — that happens in the engine, after
/// the raw [`Value`] comes back from `decode`.
pub trait Codec: Send + Sync {
    fn decode(&self, reader: &mut BitReader, binding: &BindingSpec, evaluator: &dyn Evaluator, scope: &EvalScope) -> Result<Value, EngineError>;

    fn encode(&self, writer: &mut BitWriter, binding: &BindingSpec, value: &Value, evaluator: &dyn Evaluator, scope: &EvalScope) -> Result<(), EngineError>;
}

/// Bit width of a checksum algorithm's stored value, used since
/// [`BindingSpec::Checksum`] names an algorithm rather than an explicit
/// width (§4.3 scenario S5: a `Sum16` checksum occupies 16 bits on the
/// wire).
pub fn checksum_bit_width(algorithm: &str) -> usize {
    match algorithm {
        "sum8" | "xor8" => 8,
        _ => 16,
    }
}

/// Handles every scalar/string/array-of-primitive/checksum binding kind in
/// one place, mirroring the teacher's single `assemble`/`assemble_at` match.
pub struct DefaultCodec;

impl Codec for DefaultCodec {
    fn decode(&self, reader: &mut BitReader, binding: &BindingSpec, evaluator: &dyn Evaluator, scope: &EvalScope) -> Result<Value, EngineError> {
        match binding {
            BindingSpec::Bool => Ok(Value::Bool(reader.read_bits(1)? != 0)),
            BindingSpec::Byte { unsigned } => decode_fixed_int(reader, 8, ByteOrder::BigEndian, *unsigned),
            BindingSpec::Short { byte_order, unsigned } => decode_fixed_int(reader, 16, *byte_order, *unsigned),
            BindingSpec::Int { byte_order, unsigned } => decode_fixed_int(reader, 32, *byte_order, *unsigned),
            BindingSpec::Long { byte_order, unsigned } => decode_fixed_int(reader, 64, *byte_order, *unsigned),
            BindingSpec::Float { byte_order } => {
                let bits = reader.read_uint(32, *byte_order)? as u32;
                Ok(Value::F32(f32::from_bits(bits)))
            }
            BindingSpec::Double { byte_order } => {
                let bits = reader.read_uint(64, *byte_order)?;
                Ok(Value::F64(f64::from_bits(bits)))
            }
            BindingSpec::BigInteger { size, byte_order, unsigned } => {
                let bit_len = evaluator.evaluate_size(size, scope)? as usize;
                Ok(Value::BigInt(reader.read_big_int(bit_len, *byte_order, *unsigned)?))
            }
            BindingSpec::BigDecimal { byte_order, class } => {
                let value = match class {
                    DecimalClass::Float => f32::from_bits(reader.read_uint(32, *byte_order)? as u32) as f64,
                    DecimalClass::Double => f64::from_bits(reader.read_uint(64, *byte_order)?),
                };
                Ok(Value::F64(value))
            }
            BindingSpec::StringFixed { size, charset } => {
                let len = evaluator.evaluate_size(size, scope)? as usize;
                let bytes = reader.read_text(len)?;
                Ok(Value::Str(decode_text(&bytes, *charset)))
            }
            BindingSpec::StringTerminated { terminator, consume_terminator, charset } => {
                let term = *terminator.first().unwrap_or(&0);
                let bytes = reader.read_text_until_terminator(term, *consume_terminator)?;
                Ok(Value::Str(decode_text(&bytes, *charset)))
            }
            BindingSpec::ArrayPrimitive { count, element } => {
                let n = evaluator.evaluate_size(count, scope)? as usize;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.decode(reader, element, evaluator, scope)?);
                }
                Ok(Value::Array(items))
            }
            BindingSpec::Checksum { algorithm, byte_order, .. } => {
                let width = checksum_bit_width(algorithm);
                let raw = reader.read_uint(width, *byte_order)?;
                Ok(Value::U64(raw))
            }
            BindingSpec::Object { .. } | BindingSpec::ArrayObject { .. } => {
                Err(CodecError::NoCodecForBinding(binding.kind_name()).into())
            }
        }
    }

    fn encode(&self, writer: &mut BitWriter, binding: &BindingSpec, value: &Value, evaluator: &dyn Evaluator, scope: &EvalScope) -> Result<(), EngineError> {
        match binding {
            BindingSpec::Bool => {
                writer.write_bits(value.as_bool().unwrap_or(false) as u64, 1)?;
                Ok(())
            }
            BindingSpec::Byte { unsigned } => encode_fixed_int(writer, value, 8, ByteOrder::BigEndian, *unsigned),
            BindingSpec::Short { byte_order, unsigned } => encode_fixed_int(writer, value, 16, *byte_order, *unsigned),
            BindingSpec::Int { byte_order, unsigned } => encode_fixed_int(writer, value, 32, *byte_order, *unsigned),
            BindingSpec::Long { byte_order, unsigned } => encode_fixed_int(writer, value, 64, *byte_order, *unsigned),
            BindingSpec::Float { byte_order } => {
                let f = value.as_f64().unwrap_or(0.0) as f32;
                writer.write_uint(f.to_bits() as u64, 32, *byte_order)?;
                Ok(())
            }
            BindingSpec::Double { byte_order } => {
                let f = value.as_f64().unwrap_or(0.0);
                writer.write_uint(f.to_bits(), 64, *byte_order)?;
                Ok(())
            }
            BindingSpec::BigInteger { size, byte_order, .. } => {
                let bit_len = evaluator.evaluate_size(size, scope)? as usize;
                let big = match value {
                    Value::BigInt(b) => b.clone(),
                    other => BigInt::from_i64(other.as_i64().unwrap_or(0), bit_len.div_ceil(8)),
                };
                writer.write_big_int(&big, bit_len, *byte_order)?;
                Ok(())
            }
            BindingSpec::BigDecimal { byte_order, class } => {
                let f = value.as_f64().unwrap_or(0.0);
                match class {
                    DecimalClass::Float => writer.write_uint((f as f32).to_bits() as u64, 32, *byte_order)?,
                    DecimalClass::Double => writer.write_uint(f.to_bits(), 64, *byte_order)?,
                }
                Ok(())
            }
            BindingSpec::StringFixed { size, charset } => {
                let len = evaluator.evaluate_size(size, scope)? as usize;
                let mut bytes = encode_text(value.as_str().unwrap_or(""), *charset);
                bytes.resize(len, 0);
                writer.write_text(&bytes)?;
                Ok(())
            }
            BindingSpec::StringTerminated { terminator, consume_terminator, charset } => {
                let bytes = encode_text(value.as_str().unwrap_or(""), *charset);
                writer.write_text(&bytes)?;
                if *consume_terminator {
                    writer.write_text(terminator)?;
                }
                Ok(())
            }
            BindingSpec::ArrayPrimitive { element, .. } => {
                let items = value.as_array().unwrap_or(&[]);
                for item in items {
                    self.encode(writer, element, item, evaluator, scope)?;
                }
                Ok(())
            }
            BindingSpec::Checksum { algorithm, byte_order, .. } => {
                let width = checksum_bit_width(algorithm);
                writer.write_uint(value.as_i64().unwrap_or(0) as u64, width, *byte_order)?;
                Ok(())
            }
            BindingSpec::Object { .. } | BindingSpec::ArrayObject { .. } => {
                Err(CodecError::NoCodecForBinding(binding.kind_name()).into())
            }
        }
    }
}

fn decode_fixed_int(reader: &mut BitReader, bits: usize, order: ByteOrder, unsigned: bool) -> Result<Value, EngineError> {
    if unsigned {
        Ok(Value::U64(reader.read_uint(bits, order)?))
    } else {
        Ok(Value::I64(reader.read_int(bits, order)?))
    }
}

fn encode_fixed_int(writer: &mut BitWriter, value: &Value, bits: usize, order: ByteOrder, unsigned: bool) -> Result<(), EngineError> {
    if unsigned {
        writer.write_uint(value.as_i64().unwrap_or(0) as u64, bits, order)?;
    } else {
        writer.write_int(value.as_i64().unwrap_or(0), bits, order)?;
    }
    Ok(())
}

fn decode_text(bytes: &[u8], charset: Charset) -> String {
    match charset {
        Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Charset::Ascii => bytes.iter().map(|&b| (b & 0x7f) as char).collect(),
    }
}

fn encode_text(text: &str, charset: Charset) -> Vec<u8> {
    match charset {
        Charset::Utf8 => text.as_bytes().to_vec(),
        Charset::Ascii => text.chars().map(|c| c as u8 & 0x7f).collect(),
    }
}

/// Holds every pluggable lookup the engine needs by name: codecs by binding
/// kind, converters/validators/checksummers by the name a schema author
/// gave them (§4.4 `ParserBuilder::add_codec`, and the capability traits in
/// [`crate::capabilities`]).
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Box<dyn Codec>>,
    converters: HashMap<String, Box<dyn Converter>>,
    validators: HashMap<String, Box<dyn Validator>>,
    checksummers: HashMap<String, Box<dyn Checksummer>>,
}

const SCALAR_KINDS: &[&str] = &[
    "bool",
    "byte",
    "short",
    "int",
    "long",
    "big_integer",
    "float",
    "double",
    "big_decimal",
    "string",
    "string_terminated",
    "array_primitive",
    "checksum",
];

impl CodecRegistry {
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: HashMap::new(),
            converters: HashMap::new(),
            validators: HashMap::new(),
            checksummers: HashMap::new(),
        }
    }

    /// A registry pre-populated with [`DefaultCodec`] for every scalar kind
    /// and the standard checksum algorithms from
    /// [`crate::capabilities`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in SCALAR_KINDS {
            registry.codecs.insert(kind, Box::new(DefaultCodec));
        }
        registry.register_checksummer("sum8", Box::new(Sum8));
        registry.register_checksummer("sum16", Box::new(Sum16));
        registry.register_checksummer("xor8", Box::new(Xor8));
        registry.register_checksummer("crc16ccitt", Box::new(Crc16Ccitt));
        registry
    }

    pub fn register_codec(&mut self, kind: &'static str, codec: Box<dyn Codec>) {
        self.codecs.insert(kind, codec);
    }

    pub fn register_converter(&mut self, name: impl Into<String>, converter: Box<dyn Converter>) {
        self.converters.insert(name.into(), converter);
    }

    pub fn register_validator(&mut self, name: impl Into<String>, validator: Box<dyn Validator>) {
        self.validators.insert(name.into(), validator);
    }

    pub fn register_checksummer(&mut self, name: impl Into<String>, checksummer: Box<dyn Checksummer>) {
        self.checksummers.insert(name.into(), checksummer);
    }

    pub fn codec(&self, kind: &'static str) -> Result<&dyn Codec, CodecError> {
        self.codecs.get(kind).map(|c| c.as_ref()).ok_or(CodecError::NoCodecForBinding(kind))
    }

    pub fn converter(&self, name: &str) -> Option<&dyn Converter> {
        self.converters.get(name).map(|c| c.as_ref())
    }

    pub fn validator(&self, name: &str) -> Option<&dyn Validator> {
        self.validators.get(name).map(|v| v.as_ref())
    }

    pub fn checksummer(&self, name: &str) -> Option<&dyn Checksummer> {
        self.checksummers.get(name).map(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::DefaultEvaluator;
    use crate::value::Record;

    fn scope(record: &Record) -> EvalScope {
        EvalScope { current: record, parent: None, root: None, context: None }
    }

    #[test]
    fn decodes_and_encodes_big_endian_int() {
        let evaluator = DefaultEvaluator::new();
        let record = Record::anonymous();
        let binding = BindingSpec::Int { byte_order: ByteOrder::BigEndian, unsigned: true };

        let mut reader = BitReader::new(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let decoded = DefaultCodec.decode(&mut reader, &binding, &evaluator, &scope(&record)).unwrap();
        assert_eq!(decoded, Value::U64(0xDEADBEEF));

        let mut writer = BitWriter::new();
        DefaultCodec.encode(&mut writer, &binding, &decoded, &evaluator, &scope(&record)).unwrap();
        assert_eq!(writer.into_bytes(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn decodes_array_of_primitive_with_evaluated_count() {
        let evaluator = DefaultEvaluator::new();
        let record = Record::anonymous();
        let binding = BindingSpec::ArrayPrimitive {
            count: "3".into(),
            element: Box::new(BindingSpec::Byte { unsigned: true }),
        };
        let mut reader = BitReader::new(&[1, 2, 3, 4]);
        let decoded = DefaultCodec.decode(&mut reader, &binding, &evaluator, &scope(&record)).unwrap();
        assert_eq!(decoded, Value::Array(vec![Value::U64(1), Value::U64(2), Value::U64(3)]));
    }

    #[test]
    fn decodes_fixed_string_with_ascii_charset() {
        let evaluator = DefaultEvaluator::new();
        let record = Record::anonymous();
        let binding = BindingSpec::StringFixed { size: "5".into(), charset: Charset::Ascii };
        let mut reader = BitReader::new(b"hello");
        let decoded = DefaultCodec.decode(&mut reader, &binding, &evaluator, &scope(&record)).unwrap();
        assert_eq!(decoded, Value::Str("hello".to_string()));
    }

    #[test]
    fn registry_reports_missing_codec() {
        let registry = CodecRegistry::empty();
        assert!(matches!(registry.codec("int"), Err(CodecError::NoCodecForBinding("int"))));
    }

    #[test]
    fn defaults_registry_resolves_checksummers_by_name() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.checksummer("sum16").is_some());
        assert!(registry.checksummer("unknown").is_none());
    }
}

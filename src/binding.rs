//! Binding kinds (component D, part 1): the tagged variant over wire shapes
//! a bound field can name (§4.1), plus the pluggable per-field `Converter`
//! and `Validator` traits and the polymorphic `ObjectChoices`/`Alternative`
//! selection model (§4.3's "variant selection").
//!
//! This generalizes the teacher's `FieldKind`/`ArraySpec`
//! (`crates/bitcraft/src/field.rs`) from a flat scalar/array split into the
//! full wire-kind lattice the design calls for, and splits the teacher's
//! single `Transform` (`crates/bitcraft/src/transform.rs`) into two seams —
//! `Converter` (bijective logical<->raw mapping) and `Validator`
//! (post-convert acceptance check) — since the design treats them as
//! independently pluggable.

use std::fmt;

use crate::bits::ByteOrder;
use crate::errors::EngineError;
use crate::value::Value;

/// Character encoding for string bindings (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
}

impl Charset {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "ascii" | "us-ascii" => Ok(Charset::Ascii),
            other => Err(format!("unknown charset: {other}")),
        }
    }
}

/// Maps a decoded raw [`Value`] to a logical value and back. Applied after a
/// scalar/array-of-primitive field is read off the wire, before validation
/// (§4.3 decode order: read → convert → validate).
pub trait Converter: Send + Sync {
    fn decode(&self, raw: &Value) -> Result<Value, EngineError>;
    fn encode(&self, logical: &Value) -> Result<Value, EngineError>;
}

/// Accepts or rejects a converted logical value. Runs after `Converter`
/// decode on the read path, and before `Converter` encode on the write path
/// (§4.3, §4.7 "validated overrides").
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), EngineError>;
}

/// One candidate in an `ObjectChoices`/array-of-object alternative set: a
/// named template to recurse into, guarded by an ordered condition
/// evaluated against the already-decoded prefix/fields (§4.3 "polymorphic
/// variant selection").
#[derive(Debug, Clone)]
pub struct Alternative {
    /// Name of the [`crate::template::Template`] to recurse into when this
    /// alternative's condition holds.
    pub type_name: String,
    /// Boolean expression over the in-progress record/prefix value; `None`
    /// marks the catch-all default alternative, which must be last.
    pub condition: Option<String>,
    /// Discriminant value written into `ObjectChoices.prefix_size` bits on
    /// encode when this alternative is selected (§4.3 "the alternative's
    /// prefix literal is written using prefixSize/prefixByteOrder"); `None`
    /// for a catch-all default or when `prefix_size` is 0.
    pub prefix: Option<u64>,
}

/// The full polymorphic selector for an `Object`/array-of-object binding:
/// an optional fixed-width prefix read up front (used as a discriminant in
/// `condition`s via the reserved `prefix` binding), followed by ordered
/// alternatives evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct ObjectChoices {
    /// Bit width of an optional discriminant prefix read before evaluating
    /// alternatives; `0` means no prefix is read.
    pub prefix_size: u32,
    pub prefix_byte_order: ByteOrder,
    pub alternatives: Vec<Alternative>,
}

impl ObjectChoices {
    /// `true` when at least one non-default alternative carries a
    /// condition that could reference a prefix value (§3 "prefix
    /// referenced without a prefix" validation).
    pub fn references_prefix(&self) -> bool {
        self.alternatives
            .iter()
            .filter_map(|a| a.condition.as_deref())
            .any(|c| c.contains("prefix"))
    }
}

/// A set of named converters selectable at decode/encode time by condition,
/// mirroring `ObjectChoices` but resolving to a `Converter` instead of a
/// template (§4.1 "ConverterChoices").
#[derive(Debug, Clone)]
pub struct ConverterChoice {
    pub converter_name: String,
    pub condition: Option<String>,
}

/// An ordered list of [`ConverterChoice`]s evaluated first-match-wins, the
/// way [`ObjectChoices`] resolves alternatives; a field declaring only one
/// unconditional converter is a one-candidate list (§4.1 "ConverterChoices").
#[derive(Debug, Clone)]
pub struct ConverterChoices {
    pub candidates: Vec<ConverterChoice>,
}

impl ConverterChoices {
    /// A single unconditional converter, for the common case of a field
    /// naming exactly one converter by name.
    pub fn single(converter_name: impl Into<String>) -> Self {
        ConverterChoices { candidates: vec![ConverterChoice { converter_name: converter_name.into(), condition: None }] }
    }
}

/// Discriminates the wire shape a bound field reads/writes. Each variant
/// carries exactly the parameters §4.1 lists for that kind.
#[derive(Clone)]
pub enum BindingSpec {
    Bool,
    Byte { unsigned: bool },
    Short { byte_order: ByteOrder, unsigned: bool },
    Int { byte_order: ByteOrder, unsigned: bool },
    Long { byte_order: ByteOrder, unsigned: bool },
    /// Arbitrary bit-width signed/unsigned integer; `size` is an expression
    /// evaluated against the in-progress record (component C).
    BigInteger { size: String, byte_order: ByteOrder, unsigned: bool },
    Float { byte_order: ByteOrder },
    Double { byte_order: ByteOrder },
    /// Decimal field encoded at the bit level as a `float` or `double`,
    /// depending on the declared class (§4.1 "BigDecimal").
    BigDecimal { byte_order: ByteOrder, class: DecimalClass },
    /// Fixed-length string, `size` in bytes (an expression).
    StringFixed { size: String, charset: Charset },
    /// String read up to (and optionally consuming) a terminator byte
    /// sequence.
    StringTerminated { terminator: Vec<u8>, consume_terminator: bool, charset: Charset },
    /// Fixed- or expression-counted array of a primitive element kind.
    ArrayPrimitive { count: String, element: Box<BindingSpec> },
    /// Polymorphic array of objects: each element recurses through
    /// `choices`, repeated `count` times.
    ArrayObject { count: String, choices: ObjectChoices },
    /// Single polymorphic nested object.
    Object { choices: ObjectChoices },
    /// Trailing checksum field: declares the algorithm name (looked up in
    /// the [`crate::capabilities::Checksummer`] registry), the starting
    /// seed, and the byte range it covers, relative to the template's
    /// start and end (§4.3, scenario S5).
    Checksum { algorithm: String, byte_order: ByteOrder, skip_start: usize, skip_end: usize, start_value: u64 },
}

/// Which IEEE width a `BigDecimal` field is encoded at (§4.1 "BigDecimal").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalClass {
    Float,
    Double,
}

impl DecimalClass {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "float" => Ok(DecimalClass::Float),
            "double" => Ok(DecimalClass::Double),
            other => Err(format!("unknown BigDecimal class: {other}")),
        }
    }
}

impl fmt::Debug for BindingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

impl BindingSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BindingSpec::Bool => "bool",
            BindingSpec::Byte { .. } => "byte",
            BindingSpec::Short { .. } => "short",
            BindingSpec::Int { .. } => "int",
            BindingSpec::Long { .. } => "long",
            BindingSpec::BigInteger { .. } => "big_integer",
            BindingSpec::Float { .. } => "float",
            BindingSpec::Double { .. } => "double",
            BindingSpec::BigDecimal { .. } => "big_decimal",
            BindingSpec::StringFixed { .. } => "string",
            BindingSpec::StringTerminated { .. } => "string_terminated",
            BindingSpec::ArrayPrimitive { .. } => "array_primitive",
            BindingSpec::ArrayObject { .. } => "array_object",
            BindingSpec::Object { .. } => "object",
            BindingSpec::Checksum { .. } => "checksum",
        }
    }

    /// Whether this binding names a fixed, statically-known bit width that
    /// does not require evaluating a size expression (used by the compiler
    /// to validate prefix/array-count consistency eagerly).
    pub fn is_fixed_width(&self) -> bool {
        matches!(
            self,
            BindingSpec::Bool
                | BindingSpec::Byte { .. }
                | BindingSpec::Short { .. }
                | BindingSpec::Int { .. }
                | BindingSpec::Long { .. }
                | BindingSpec::Float { .. }
                | BindingSpec::Double { .. }
        )
    }

    pub fn is_object_like(&self) -> bool {
        matches!(self, BindingSpec::Object { .. } | BindingSpec::ArrayObject { .. })
    }
}

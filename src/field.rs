//! Template compiler input (component D, part 2): the pre-compile schema
//! shape a host hands to [`crate::template::Template::compile`], and the
//! compiled field records the compiler produces.
//!
//! Where the teacher's `Field`/`FieldKind` (`crates/bitcraft/src/field.rs`)
//! is itself the compile input, here the input (`SchemaEntry`) and the
//! compiled output (`BoundField`/`EvaluatedField`) are split, because the
//! design's compiler performs real validation and reordering work (§3)
//! beyond the teacher's flat `TryFrom<&Field>` conversion
//! (`crates/bitcraft/src/compiled.rs`).

use crate::binding::{BindingSpec, ConverterChoices};

/// Number of bits to skip before a field, either a literal count or a
/// `size`-style expression (§4.1 "skip").
#[derive(Debug, Clone)]
pub enum SkipSpec {
    Bits(u32),
    Expression(String),
}

/// The fixed byte sequence a message starts with, used by the loader to key
/// templates (§5) and by the engine to validate the leading bytes on
/// decode, plus an optional fixed byte sequence every message of this type
/// ends with, checked (decode) or written (encode) after every bound and
/// evaluated field (§4.3 "terminator").
#[derive(Debug, Clone)]
pub struct HeaderSpec {
    pub start_bytes: Vec<u8>,
    pub end_bytes: Option<Vec<u8>>,
}

impl HeaderSpec {
    /// A header with only a start pattern and no trailing end marker.
    pub fn new(start_bytes: Vec<u8>) -> Self {
        HeaderSpec { start_bytes, end_bytes: None }
    }

    /// Attaches a fixed trailing byte sequence every message of this type
    /// must end with (§4.3 "terminator").
    pub fn with_end_bytes(mut self, end_bytes: Vec<u8>) -> Self {
        self.end_bytes = Some(end_bytes);
        self
    }
}

/// One bound (wire-backed) field as supplied by the host, before compiling.
#[derive(Debug, Clone)]
pub struct BoundFieldSpec {
    pub field_name: String,
    /// Bits to skip immediately before this field (possibly several skips
    /// collapse into one — the compiler coalesces them).
    pub skip_before: Vec<SkipSpec>,
    /// Boolean expression gating whether this field is present at all;
    /// `None` means always present.
    pub condition: Option<String>,
    pub binding: BindingSpec,
    /// Optional post-convert validator name, looked up in the engine's
    /// validator registry.
    pub validator: Option<String>,
    /// Optional ordered converter selection, each candidate looked up by
    /// name in the engine's converter registry (§4.1 "ConverterChoices").
    pub converter: Option<ConverterChoices>,
}

/// One evaluated (non-wire) field: computed from an expression after all
/// bound fields have been read, never itself consuming bits (§4.1
/// "evaluate").
#[derive(Debug, Clone)]
pub struct EvaluatedFieldSpec {
    pub field_name: String,
    pub value_expr: String,
    pub condition: Option<String>,
}

/// One entry in a host-supplied schema, in declaration order. The compiler
/// partitions these into the template's separate `bound_fields` and
/// `evaluated_fields` lists (§3), preserving relative order within each.
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    Bound(BoundFieldSpec),
    Evaluated(EvaluatedFieldSpec),
}

/// A compiled bound field, ready for the engine to read/write (§4.3).
#[derive(Debug, Clone)]
pub struct BoundField {
    pub field_name: String,
    pub skip_before_bits: Option<SkipBits>,
    pub condition: Option<String>,
    pub binding: BindingSpec,
    pub validator: Option<String>,
    pub converter: Option<ConverterChoices>,
}

/// A skip amount resolved at compile time into either a known bit count or
/// a still-deferred expression (only literal skips can be coalesced).
#[derive(Debug, Clone)]
pub enum SkipBits {
    Bits(u32),
    Expression(String),
}

/// A compiled evaluated field.
#[derive(Debug, Clone)]
pub struct EvaluatedField {
    pub field_name: String,
    pub value_expr: String,
    pub condition: Option<String>,
}

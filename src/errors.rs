//! Error taxonomy for the codec engine (§7 of the design).
//!
//! Static errors (`AnnotationError`) are raised while compiling a schema into
//! a [`crate::template::Template`]; dynamic errors are raised while decoding
//! or encoding a message. [`ParseError`]/[`ComposeError`] are never returned
//! directly to a caller of [`crate::parser::Parser`] — they are collected,
//! alongside the byte offset at which the failing message started, into the
//! `errors` list of a `ParseResponse`/`ComposeResponse`.

use thiserror::Error;

/// Schema is malformed: wrong target type, missing required attribute,
/// mutually exclusive attributes set together, invalid protocol range,
/// invalid charset, variant/prefix mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("template has no header")]
    MissingHeader,
    #[error("template has no bound fields")]
    EmptyBoundFields,
    #[error("template declares more than one checksum field")]
    DuplicateChecksum,
    #[error("prefixSize {0} out of range [0,32]")]
    PrefixSizeOutOfRange(u32),
    #[error("alternative condition references #prefix but prefixSize is 0")]
    PrefixReferencedWithoutPrefix,
    #[error("prefixSize > 0 but alternative has no condition")]
    AlternativeMissingCondition,
    #[error("array element type {0:?} is not a primitive")]
    ArrayElementNotPrimitive(&'static str),
    #[error("BindDecimal field type must be float or double")]
    InvalidDecimalType,
    #[error("unknown charset {0:?}")]
    UnknownCharset(String),
    #[error("field {0:?} has no binding and no evaluate/skip annotation")]
    FieldHasNoAnnotation(String),
    #[error("field {0:?} has more than one data binding")]
    MultipleBindingsOnField(String),
}

/// No template matches current bytes, duplicate header key on registration,
/// a type was requested as a template but was never registered as one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("no template matches the next bytes of the stream")]
    NoTemplate,
    #[error("header key {0:?} is already registered to another template")]
    Collision(String),
    #[error("type {0:?} is not registered as a template")]
    NotATemplate(String),
}

/// No codec registered for a binding kind; variant selection produced no
/// match and no default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("no codec registered for binding kind {0:?}")]
    NoCodecForBinding(&'static str),
    #[error("no alternative matched and no default variant is set")]
    NoCodecForVariant,
    #[error("runtime value has no matching alternative for encode")]
    NoAlternativeForValue,
}

/// Checksum mismatch between computed and stored values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("checksum mismatch: computed {computed:#x}, expected {expected:#x}")]
pub struct ChecksumError {
    pub computed: u64,
    pub expected: u64,
}

/// Header `end` bytes did not match what was read from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("terminator mismatch: expected {expected:?}, found {found:?}")]
pub struct TerminatorError {
    pub expected: Vec<u8>,
    pub found: Vec<u8>,
}

/// User-supplied value rejected during encode (pattern/range/enum/mandatory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("value for {0:?} failed pattern validation")]
    PatternMismatch(String),
    #[error("value for {0:?} is out of range [{min}, {max}]")]
    OutOfRange { field: String, min: String, max: String },
    #[error("value for {0:?} is not one of the allowed enumeration values")]
    NotInEnumeration(String),
    #[error("mandatory field {0:?} was not supplied")]
    MandatoryMissing(String),
}

/// Duplicate short description, default incompatible with declared
/// constraints, etc.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("short description {0:?} is not unique within this configuration")]
    DuplicateShortDescription(String),
    #[error("field {0:?} sets more than one of {{pattern, min/max, enumeration}}")]
    MutuallyExclusiveConstraints(String),
    #[error("minProtocol > maxProtocol for field {0:?}")]
    InvalidProtocolRange(String),
    #[error("default value for {0:?} does not satisfy its own constraints")]
    DefaultViolatesConstraints(String),
    #[error("primitive field {0:?} has no default")]
    PrimitiveFieldMissingDefault(String),
    #[error("no configuration is registered under type name {0:?}")]
    NotAConfiguration(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Bit-buffer exhaustion: fatal to the current read/write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("attempted to read past the end of the buffer")]
    OutOfBounds,
    #[error("cannot read more than 64 bits into a single integer")]
    TooManyBitsRequested,
    #[error("attempted to restore a fallback mark that was never set")]
    NoFallbackMark,
    #[error("expression evaluated to a negative size")]
    NegativeSize,
}

/// A codec raised during decode/encode of a specific field; carries the
/// template name and field name (§7: `FieldError`).
#[derive(Debug, Error)]
#[error("field {field:?} of template {template:?}: {source}")]
pub struct FieldError {
    pub template: String,
    pub field: String,
    #[source]
    pub source: EngineError,
}

/// Any error the engine can raise while decoding or encoding a single
/// message (i.e. everything that can occur once a [`crate::template::Template`]
/// has already been selected and compiled).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
    #[error(transparent)]
    Terminator(#[from] TerminatorError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("expression {0:?} failed to evaluate: {1}")]
    Expression(String, String),
    #[error("{0}")]
    Other(String),
}

/// Top-level error surfaced from [`crate::parser::Parser::parse`]/`compose`
/// and from schema compilation.
#[derive(Debug, Error)]
pub enum EngineTopError {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

//! A declarative bit-level codec engine: decode and encode binary protocol
//! messages from a schema built once and shared by both directions.
//!
//! A schema is compiled by [`template::Template::compile`] into an ordered
//! field plan; [`parser::Parser`] then dispatches incoming bytes to the
//! right template by header, decodes or encodes through the pluggable
//! [`codec::CodecRegistry`], and resynchronizes past corrupt frames rather
//! than aborting a whole stream. [`config`] projects a separate,
//! protocol-version-gated configuration schema into three views for
//! administration, protocol filtering, and materialized defaults.
//!
//! Bits are addressed MSB-first throughout — see [`bits`] for the exact
//! convention and why it matters for byte-order handling.

pub mod binding;
pub mod bits;
pub mod capabilities;
pub mod codec;
pub mod config;
pub mod context;
pub mod datatype;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod events;
pub mod field;
pub mod loader;
pub mod parser;
#[cfg(feature = "serde")]
pub mod serde_def;
pub mod template;
pub mod value;

pub use errors::{EngineError, EngineTopError, FieldError};
pub use parser::{Parser, ParserBuilder};
pub use template::Template;
pub use value::{Record, Value};

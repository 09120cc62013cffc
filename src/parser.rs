//! Parser facade (component H, §4.4/§4.6): the crate's main entry point.
//! A [`ParserBuilder`] assembles codecs, templates, configurations, and
//! process-wide context bindings; the built [`Parser`] then decodes
//! (`parse`) or encodes (`compose`) messages, collecting per-message errors
//! rather than aborting a whole batch on the first bad frame (§4.6).
//!
//! Mirrors the shape of the teacher's top-level `Schema` as the crate's one
//! "do the thing" type, generalized with the builder step the design's
//! richer construction (pluggable codecs/configurations/context) needs —
//! the teacher's `Schema::compile` has no equivalent builder because it has
//! nothing pluggable to assemble first.

use crate::codec::CodecRegistry;
use crate::config::{ConfigurationFacade, ConfigurationRegistry};
use crate::context::GlobalContext;
use crate::errors::{EngineTopError, FieldError};
use crate::evaluator::{DefaultEvaluator, Evaluator};
use crate::events::{EventListener, NullEventListener};
use crate::loader::TemplateRegistry;
use crate::template::Template;
use crate::value::{Record, Value};

/// Assembles a [`Parser`]. Every `add_*` call is infallible at the builder
/// stage; validation happens in `build` (registering a colliding template
/// header, for instance).
pub struct ParserBuilder {
    codecs: CodecRegistry,
    templates: TemplateRegistry,
    configurations: ConfigurationRegistry,
    context: GlobalContext,
    evaluator: Box<dyn Evaluator>,
    listener: Box<dyn EventListener>,
}

impl ParserBuilder {
    pub fn new() -> Self {
        ParserBuilder {
            codecs: CodecRegistry::with_defaults(),
            templates: TemplateRegistry::new(),
            configurations: ConfigurationRegistry::new(),
            context: GlobalContext::default(),
            evaluator: Box::new(DefaultEvaluator::new()),
            listener: Box::new(NullEventListener),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_event_listener(mut self, listener: Box<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn add_codec(mut self, kind: &'static str, codec: Box<dyn crate::codec::Codec>) -> Self {
        self.listener.codec_loading(kind);
        self.codecs.register_codec(kind, codec);
        self.listener.codec_loaded(kind);
        self
    }

    pub fn add_converter(mut self, name: impl Into<String>, converter: Box<dyn crate::binding::Converter>) -> Self {
        self.codecs.register_converter(name, converter);
        self
    }

    pub fn add_validator(mut self, name: impl Into<String>, validator: Box<dyn crate::binding::Validator>) -> Self {
        self.codecs.register_validator(name, validator);
        self
    }

    pub fn add_checksummer(mut self, name: impl Into<String>, checksummer: Box<dyn crate::capabilities::Checksummer>) -> Self {
        self.codecs.register_checksummer(name, checksummer);
        self
    }

    pub fn add_template(mut self, template: Template) -> Result<Self, EngineTopError> {
        self.listener.template_loading(&template.type_name);
        match self.templates.register(template) {
            Ok(()) => {
                self.listener.template_loaded("ok");
                Ok(self)
            }
            Err(e) => {
                self.listener.template_load_failed("template", &e.to_string());
                Err(e.into())
            }
        }
    }

    pub fn add_configuration(mut self, configuration: crate::config::Configuration) -> Result<Self, EngineTopError> {
        self.listener.configuration_loading(&configuration.type_name);
        self.configurations.register(configuration)?;
        self.listener.configuration_loaded("ok");
        Ok(self)
    }

    pub fn add_to_context(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.insert(name, value);
        self
    }

    pub fn build(self) -> Parser {
        Parser {
            codecs: self.codecs,
            templates: self.templates,
            configurations: self.configurations,
            context: self.context,
            evaluator: self.evaluator,
            listener: self.listener,
        }
    }
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One decoded message plus the byte offset its header started at, or the
/// error that prevented decoding it.
pub struct ParsedMessage {
    pub start_offset: usize,
    pub type_name: String,
    pub record: Record,
}

/// A decode failure anchored to the byte offset where the dispatcher was
/// attempting to match a template.
pub struct ParseFailure {
    pub offset: usize,
    pub error: EngineTopError,
}

/// Result of [`Parser::parse`]: every message decoded so far, plus every
/// failure encountered along the way (§4.6 "collect, don't abort").
#[derive(Default)]
pub struct ParseResponse {
    pub parsed: Vec<ParsedMessage>,
    pub errors: Vec<ParseFailure>,
}

pub struct ComposeFailure {
    pub type_name: String,
    pub error: EngineTopError,
}

#[derive(Default)]
pub struct ComposeResponse {
    pub bytes: Vec<u8>,
    pub errors: Vec<ComposeFailure>,
}

/// The assembled decoder/encoder. Immutable and thread-safe once built
/// (§1: "registries immutable after construction").
pub struct Parser {
    codecs: CodecRegistry,
    templates: TemplateRegistry,
    configurations: ConfigurationRegistry,
    context: GlobalContext,
    evaluator: Box<dyn Evaluator>,
    listener: Box<dyn EventListener>,
}

impl Parser {
    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    pub fn configurations(&self) -> &ConfigurationRegistry {
        &self.configurations
    }

    pub fn configuration_facade(&self) -> ConfigurationFacade<'_> {
        ConfigurationFacade::new(&self.configurations)
    }

    pub fn context(&self) -> &GlobalContext {
        &self.context
    }

    /// Decodes every message found in `bytes`, starting at offset `0`.
    /// After a decode failure, resynchronizes by scanning forward for the
    /// next plausible header with [`TemplateRegistry::find_next_message_index`]
    /// rather than aborting the whole buffer (§4.6). Any bytes left after
    /// the last recognized header, with no template matching them, are
    /// reported as a final trailing-bytes failure at their offset.
    pub fn parse(&self, bytes: &[u8]) -> ParseResponse {
        let mut response = ParseResponse::default();
        let mut offset = 0usize;

        while offset < bytes.len() {
            let remaining = &bytes[offset..];
            match self.templates.find_matching(remaining) {
                Ok(template) => {
                    let engine = self.engine();
                    let mut reader = crate::bits::BitReader::new(remaining);
                    match engine.decode(template, &mut reader) {
                        Ok(record) => {
                            let consumed = reader.position();
                            response.parsed.push(ParsedMessage { start_offset: offset, type_name: template.type_name.clone(), record });
                            offset += consumed.max(1);
                        }
                        Err(e) => {
                            response.errors.push(ParseFailure { offset, error: e.into() });
                            offset = self.resync(bytes, offset);
                        }
                    }
                }
                Err(e) => {
                    response.errors.push(ParseFailure { offset, error: e.into() });
                    offset = self.resync(bytes, offset);
                }
            }
        }

        response
    }

    fn resync(&self, bytes: &[u8], offset: usize) -> usize {
        match self.templates.find_next_message_index(bytes, offset + 1) {
            Some(next) => next,
            None => bytes.len(),
        }
    }

    /// Encodes each `(type_name, record)` pair in order, concatenating
    /// successful encodes and collecting per-message failures (mirrors
    /// `parse`'s collect-don't-abort policy on the write path).
    pub fn compose(&self, messages: &[(String, Record)]) -> ComposeResponse {
        let mut response = ComposeResponse::default();
        let engine = self.engine();

        for (type_name, record) in messages {
            match self.templates.get(type_name) {
                Ok(template) => match engine.encode(template, record) {
                    Ok(bytes) => response.bytes.extend(bytes),
                    Err(e) => response.errors.push(ComposeFailure { type_name: type_name.clone(), error: e.into() }),
                },
                Err(e) => response.errors.push(ComposeFailure { type_name: type_name.clone(), error: e.into() }),
            }
        }

        response
    }

    fn engine(&self) -> crate::engine::Engine<'_> {
        crate::engine::Engine {
            codecs: &self.codecs,
            evaluator: self.evaluator.as_ref(),
            templates: &self.templates,
            listener: self.listener.as_ref(),
            context: &self.context,
        }
    }
}

impl From<FieldError> for EngineTopError {
    fn from(e: FieldError) -> Self {
        EngineTopError::Field(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::field::{BoundFieldSpec, HeaderSpec, SchemaEntry};

    fn byte_template(type_name: &str, header: u8) -> Template {
        let entries = vec![SchemaEntry::Bound(BoundFieldSpec {
            field_name: "value".into(),
            skip_before: vec![],
            condition: None,
            binding: BindingSpec::Byte { unsigned: true },
            validator: None,
            converter: None,
        })];
        Template::compile(type_name, HeaderSpec::new(vec![header]), entries).unwrap()
    }

    #[test]
    fn parses_two_consecutive_messages() {
        let parser = ParserBuilder::new().add_template(byte_template("Ping", 0xAA)).unwrap().build();

        let bytes = [0xAA, 0x01, 0xAA, 0x02];
        let response = parser.parse(&bytes);
        assert_eq!(response.parsed.len(), 2);
        assert!(response.errors.is_empty());
        assert_eq!(response.parsed[0].record.get("value"), Some(&Value::U64(1)));
        assert_eq!(response.parsed[1].record.get("value"), Some(&Value::U64(2)));
    }

    #[test]
    fn resyncs_past_unrecognized_bytes() {
        let parser = ParserBuilder::new().add_template(byte_template("Ping", 0xAA)).unwrap().build();

        let bytes = [0x00, 0x00, 0xAA, 0x05];
        let response = parser.parse(&bytes);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.parsed.len(), 1);
        assert_eq!(response.parsed[0].record.get("value"), Some(&Value::U64(5)));
    }

    #[test]
    fn composes_a_registered_template_back_to_bytes() {
        let parser = ParserBuilder::new().add_template(byte_template("Ping", 0xAA)).unwrap().build();

        let record = Record::new("Ping").with("value", Value::U64(9));
        let response = parser.compose(&[("Ping".to_string(), record)]);
        assert!(response.errors.is_empty());
        assert_eq!(response.bytes, vec![0xAA, 0x09]);
    }
}

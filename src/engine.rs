//! Template engine (component F, §4.3): runs a compiled [`Template`]'s
//! decode and encode passes over a bit stream. This is the one place the
//! design lets binding dispatch leave the generic [`crate::codec::Codec`]
//! seam — `Object`/`ArrayObject` bindings recurse into another template by
//! name, which needs a [`TemplateRegistry`] back-reference a `Codec` does
//! not carry, so polymorphic variant selection is handled here directly
//! rather than through the codec registry.
//!
//! Generalizes the teacher's `Schema::parse` top-level loop
//! (`crates/bitcraft/src/schema.rs`), which reads every `CompiledField` in
//! order into a flat map, into a loop that also evaluates conditions,
//! resolves polymorphic alternatives, runs evaluated fields, and verifies a
//! trailing checksum.

use crate::binding::{Alternative, BindingSpec, ObjectChoices};
use crate::bits::{BitReader, BitWriter};
use crate::codec::{checksum_bit_width, CodecRegistry};
use crate::context::GlobalContext;
use crate::context::ScopeGuard;
use crate::context::ScopeStack;
use crate::errors::{ChecksumError, CodecError, EngineError, FieldError};
use crate::evaluator::{EvalScope, Evaluator};
use crate::events::EventListener;
use crate::field::{BoundField, SkipBits};
use crate::loader::TemplateRegistry;
use crate::template::Template;
use crate::value::{Record, Value};

/// Runs decode/encode passes for a single [`Template`] against the shared
/// codec registry, evaluator, template registry (for recursive
/// object/array-of-object fields), and event listener a [`crate::parser::Parser`]
/// owns.
pub struct Engine<'a> {
    pub codecs: &'a CodecRegistry,
    pub evaluator: &'a dyn Evaluator,
    pub templates: &'a TemplateRegistry,
    pub listener: &'a dyn EventListener,
    /// Process-wide bindings reachable from expressions via `context.<name>`.
    pub context: &'a GlobalContext,
}

impl<'a> Engine<'a> {
    /// Decodes one message of type `template` starting at the reader's
    /// current position, including matching and consuming its header.
    pub fn decode(&self, template: &Template, reader: &mut BitReader) -> Result<Record, FieldError> {
        self.expect_header(template, reader)?;
        let mut stack = ScopeStack::new(Record::new(&template.type_name));
        self.decode_fields(template, reader, &mut stack)?;
        self.expect_trailer(template, reader)?;
        Ok(stack.into_root())
    }

    /// Encodes `record` according to `template`, returning the full
    /// message bytes including its header.
    pub fn encode(&self, template: &Template, record: &Record) -> Result<Vec<u8>, FieldError> {
        let mut writer = BitWriter::new();
        writer
            .write_text(&template.header.start_bytes)
            .map_err(|e| self.field_err(template, "<header>", e.into()))?;
        let mut stack = ScopeStack::new(record.clone());
        self.encode_fields(template, &mut writer, &mut stack)?;
        if let Some(end_bytes) = &template.header.end_bytes {
            writer.write_text(end_bytes).map_err(|e| self.field_err(template, "<trailer>", e.into()))?;
        }
        Ok(writer.into_bytes())
    }

    fn expect_header(&self, template: &Template, reader: &mut BitReader) -> Result<(), FieldError> {
        let expected = &template.header.start_bytes;
        let found = reader.read_text(expected.len()).map_err(|e| self.field_err(template, "<header>", e.into()))?;
        if &found != expected {
            return Err(self.field_err(
                template,
                "<header>",
                crate::errors::TerminatorError { expected: expected.clone(), found }.into(),
            ));
        }
        Ok(())
    }

    /// Checks the fixed trailing byte sequence declared on the header, if
    /// any, consuming it from `reader` (§4.3 step 5 "terminator").
    fn expect_trailer(&self, template: &Template, reader: &mut BitReader) -> Result<(), FieldError> {
        let Some(expected) = &template.header.end_bytes else {
            return Ok(());
        };
        let found = reader.read_text(expected.len()).map_err(|e| self.field_err(template, "<trailer>", e.into()))?;
        if &found != expected {
            return Err(self.field_err(
                template,
                "<trailer>",
                crate::errors::TerminatorError { expected: expected.clone(), found }.into(),
            ));
        }
        Ok(())
    }

    fn field_err(&self, template: &Template, field: &str, source: EngineError) -> FieldError {
        self.listener.field_failed(&template.type_name, field, &source.to_string());
        FieldError { template: template.type_name.clone(), field: field.to_string(), source }
    }

    fn decode_fields(&self, template: &Template, reader: &mut BitReader, stack: &mut ScopeStack) -> Result<(), FieldError> {
        let checksum_start = reader.position();

        for field in &template.bound_fields {
            self.decode_one_field(template, field, reader, stack)?;
        }

        if let Some(checksum_field) = &template.checksum {
            self.verify_checksum(template, checksum_field, reader, checksum_start)?;
        }

        for evaluated in &template.evaluated_fields {
            let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };
            let present = self
                .evaluator
                .evaluate_boolean(evaluated.condition.as_deref().unwrap_or(""), &scope)
                .map_err(|e| self.field_err(template, &evaluated.field_name, e))?;
            if !present {
                continue;
            }
            let value = self
                .evaluator
                .evaluate(&evaluated.value_expr, &scope)
                .map_err(|e| self.field_err(template, &evaluated.field_name, e))?;
            stack.current_mut().set(evaluated.field_name.clone(), value);
            self.listener.field_evaluated(&template.type_name, &evaluated.field_name);
        }

        Ok(())
    }

    fn decode_one_field(&self, template: &Template, field: &BoundField, reader: &mut BitReader, stack: &mut ScopeStack) -> Result<(), FieldError> {
        self.listener.field_reading(&template.type_name, &field.field_name);

        let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };
        if let Some(skip) = &field.skip_before_bits {
            let bits = match skip {
                SkipBits::Bits(n) => *n as usize,
                SkipBits::Expression(expr) => self
                    .evaluator
                    .evaluate_size(expr, &scope)
                    .map_err(|e| self.field_err(template, &field.field_name, e))? as usize,
            };
            reader.skip_bits(bits).map_err(|e| self.field_err(template, &field.field_name, e.into()))?;
        }

        let present = self
            .evaluator
            .evaluate_boolean(field.condition.as_deref().unwrap_or(""), &scope)
            .map_err(|e| self.field_err(template, &field.field_name, e))?;
        if !present {
            stack.current_mut().set(field.field_name.clone(), Value::Unset);
            return Ok(());
        }

        let value = if field.binding.is_object_like() {
            self.decode_object_like(template, field, reader, stack)?
        } else {
            let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };
            let raw = self
                .codecs
                .codec(field.binding.kind_name())
                .map_err(EngineError::from)
                .and_then(|codec| codec.decode(reader, &field.binding, self.evaluator, &scope))
                .map_err(|e| self.field_err(template, &field.field_name, e))?;
            self.apply_converter_and_validate(template, field, raw, &scope)?
        };

        stack.current_mut().set(field.field_name.clone(), value);
        self.listener.field_read(&template.type_name, &field.field_name);
        Ok(())
    }

    fn apply_converter_and_validate(&self, template: &Template, field: &BoundField, raw: Value, scope: &EvalScope) -> Result<Value, FieldError> {
        let converted = match self.select_converter(template, field, scope)? {
            Some(name) => match self.codecs.converter(name) {
                Some(converter) => converter.decode(&raw).map_err(|e| self.field_err(template, &field.field_name, e))?,
                None => raw,
            },
            None => raw,
        };
        if let Some(name) = &field.validator {
            if let Some(validator) = self.codecs.validator(name) {
                validator.validate(&converted).map_err(|e| self.field_err(template, &field.field_name, e))?;
            }
        }
        Ok(converted)
    }

    /// Picks the first matching candidate out of a field's `ConverterChoices`
    /// (§4.1 "ConverterChoices"), mirroring `select_alternative` but
    /// returning `None` rather than an error when nothing matches.
    fn select_converter<'c>(&self, template: &Template, field: &'c BoundField, scope: &EvalScope) -> Result<Option<&'c str>, FieldError> {
        let Some(choices) = &field.converter else {
            return Ok(None);
        };
        for candidate in &choices.candidates {
            let matches = match &candidate.condition {
                None => true,
                Some(expr) => self
                    .evaluator
                    .evaluate_boolean(expr, scope)
                    .map_err(|e| self.field_err(template, &field.field_name, e))?,
            };
            if matches {
                return Ok(Some(candidate.converter_name.as_str()));
            }
        }
        Ok(None)
    }

    fn decode_object_like(&self, template: &Template, field: &BoundField, reader: &mut BitReader, stack: &mut ScopeStack) -> Result<Value, FieldError> {
        match &field.binding {
            BindingSpec::Object { choices } => {
                let record = self.decode_one_alternative(template, field, choices, reader, stack)?;
                Ok(Value::Object(record))
            }
            BindingSpec::ArrayObject { count, choices } => {
                let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };
                let n = self
                    .evaluator
                    .evaluate_size(count, &scope)
                    .map_err(|e| self.field_err(template, &field.field_name, e))? as usize;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    let record = self.decode_one_alternative(template, field, choices, reader, stack)?;
                    items.push(Value::Object(record));
                }
                Ok(Value::Array(items))
            }
            _ => unreachable!("decode_object_like called on a non-object binding"),
        }
    }

    fn decode_one_alternative(
        &self,
        template: &Template,
        field: &BoundField,
        choices: &ObjectChoices,
        reader: &mut BitReader,
        stack: &mut ScopeStack,
    ) -> Result<Record, FieldError> {
        let prefix = if choices.prefix_size > 0 {
            Some(
                reader
                    .read_uint(choices.prefix_size as usize, choices.prefix_byte_order)
                    .map_err(|e| self.field_err(template, &field.field_name, e.into()))?,
            )
        } else {
            None
        };

        let mut guard = ScopeGuard::push(stack, {
            let mut r = Record::anonymous();
            if let Some(p) = prefix {
                r.set("prefix", Value::U64(p));
            }
            r
        });

        let alternative = {
            let inner_scope =
                EvalScope { current: guard.stack().current(), parent: guard.stack().parent(), root: Some(guard.stack().root()), context: Some(self.context) };
            self.select_alternative(template, field, choices, &inner_scope)?
        };

        let nested_template = self
            .templates
            .get(&alternative.type_name)
            .map_err(|e| self.field_err(template, &field.field_name, e.into()))?;

        self.expect_header(nested_template, reader)?;
        self.decode_fields(nested_template, reader, guard.stack())?;

        let mut record = guard.finish();
        record.type_name = Some(alternative.type_name.clone());
        Ok(record)
    }

    fn select_alternative<'c>(
        &self,
        template: &Template,
        field: &BoundField,
        choices: &'c ObjectChoices,
        scope: &EvalScope,
    ) -> Result<&'c Alternative, FieldError> {
        for alternative in &choices.alternatives {
            let matches = match &alternative.condition {
                None => true,
                Some(expr) => self
                    .evaluator
                    .evaluate_boolean(expr, scope)
                    .map_err(|e| self.field_err(template, &field.field_name, e))?,
            };
            if matches {
                return Ok(alternative);
            }
        }
        Err(self.field_err(template, &field.field_name, CodecError::NoCodecForVariant.into()))
    }

    fn verify_checksum(&self, template: &Template, checksum_field: &BoundField, reader: &mut BitReader, start: usize) -> Result<(), FieldError> {
        let (algorithm, skip_start, skip_end, start_value) = match &checksum_field.binding {
            BindingSpec::Checksum { algorithm, skip_start, skip_end, start_value, .. } => (algorithm, *skip_start, *skip_end, *start_value),
            _ => unreachable!("checksum field must carry a Checksum binding"),
        };

        let scope_record = Record::anonymous();
        let scope = EvalScope { current: &scope_record, parent: None, root: None, context: Some(self.context) };
        let stored = self
            .codecs
            .codec(checksum_field.binding.kind_name())
            .map_err(EngineError::from)
            .and_then(|codec| codec.decode(reader, &checksum_field.binding, self.evaluator, &scope))
            .map_err(|e| self.field_err(template, &checksum_field.field_name, e))?;
        let stored = stored.as_i64().unwrap_or(0) as u64;
        let end = reader.position();

        let checksummer = self
            .codecs
            .checksummer(algorithm)
            .ok_or_else(|| self.field_err(template, &checksum_field.field_name, EngineError::Other(format!("unknown checksum algorithm {algorithm:?}"))))?;

        let underlying_len = reader.underlying().len();
        let effective_start = (start + skip_start).min(underlying_len);
        let effective_end = end.saturating_sub(skip_end).max(effective_start).min(underlying_len);
        let computed = checksummer.compute(reader.underlying(), effective_start, effective_end, start_value);

        if computed != stored {
            return Err(self.field_err(
                template,
                &checksum_field.field_name,
                ChecksumError { computed, expected: stored }.into(),
            ));
        }
        Ok(())
    }

    // ---- encode -----------------------------------------------------------

    fn encode_fields(&self, template: &Template, writer: &mut BitWriter, stack: &mut ScopeStack) -> Result<(), FieldError> {
        let checksum_start = writer.flushed_bytes().len();

        for field in &template.bound_fields {
            self.encode_one_field(template, field, writer, stack)?;
        }

        if let Some(checksum_field) = &template.checksum {
            self.write_checksum(template, checksum_field, writer, checksum_start)?;
        }

        Ok(())
    }

    fn encode_one_field(&self, template: &Template, field: &BoundField, writer: &mut BitWriter, stack: &mut ScopeStack) -> Result<(), FieldError> {
        let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };

        let present = self
            .evaluator
            .evaluate_boolean(field.condition.as_deref().unwrap_or(""), &scope)
            .map_err(|e| self.field_err(template, &field.field_name, e))?;
        if !present {
            return Ok(());
        }

        if let Some(skip) = &field.skip_before_bits {
            let bits = match skip {
                SkipBits::Bits(n) => *n as usize,
                SkipBits::Expression(expr) => self
                    .evaluator
                    .evaluate_size(expr, &scope)
                    .map_err(|e| self.field_err(template, &field.field_name, e))? as usize,
            };
            writer.write_bits(0, bits).map_err(|e| self.field_err(template, &field.field_name, e.into()))?;
        }

        let value = stack.current().get(&field.field_name).cloned().unwrap_or(Value::Unset);
        if matches!(value, Value::Unset) {
            return Ok(());
        }

        if field.binding.is_object_like() {
            self.encode_object_like(template, field, &value, writer, stack)?;
        } else {
            let scope = EvalScope { current: stack.current(), parent: stack.parent(), root: Some(stack.root()), context: Some(self.context) };
            let raw = self.apply_encode_converter(template, field, &value, &scope)?;
            self.codecs
                .codec(field.binding.kind_name())
                .map_err(EngineError::from)
                .and_then(|codec| codec.encode(writer, &field.binding, &raw, self.evaluator, &scope))
                .map_err(|e| self.field_err(template, &field.field_name, e))?;
        }

        self.listener.field_written(&template.type_name, &field.field_name);
        Ok(())
    }

    fn apply_encode_converter(&self, template: &Template, field: &BoundField, logical: &Value, scope: &EvalScope) -> Result<Value, FieldError> {
        if let Some(name) = &field.validator {
            if let Some(validator) = self.codecs.validator(name) {
                validator.validate(logical).map_err(|e| self.field_err(template, &field.field_name, e))?;
            }
        }
        match self.select_converter(template, field, scope)? {
            Some(name) => match self.codecs.converter(name) {
                Some(converter) => converter.encode(logical).map_err(|e| self.field_err(template, &field.field_name, e)),
                None => Ok(logical.clone()),
            },
            None => Ok(logical.clone()),
        }
    }

    fn encode_object_like(&self, template: &Template, field: &BoundField, value: &Value, writer: &mut BitWriter, stack: &mut ScopeStack) -> Result<(), FieldError> {
        match &field.binding {
            BindingSpec::Object { choices } => {
                let record = value
                    .as_object()
                    .ok_or_else(|| self.field_err(template, &field.field_name, EngineError::Other("expected an object value".into())))?;
                self.encode_one_alternative(template, field, choices, record, writer, stack)
            }
            BindingSpec::ArrayObject { choices, .. } => {
                let items = value.as_array().unwrap_or(&[]);
                for item in items {
                    let record = item
                        .as_object()
                        .ok_or_else(|| self.field_err(template, &field.field_name, EngineError::Other("expected an object element".into())))?;
                    self.encode_one_alternative(template, field, choices, record, writer, stack)?;
                }
                Ok(())
            }
            _ => unreachable!("encode_object_like called on a non-object binding"),
        }
    }

    fn encode_one_alternative(
        &self,
        template: &Template,
        field: &BoundField,
        choices: &ObjectChoices,
        record: &Record,
        writer: &mut BitWriter,
        stack: &mut ScopeStack,
    ) -> Result<(), FieldError> {
        let type_name = record
            .type_name
            .clone()
            .ok_or_else(|| self.field_err(template, &field.field_name, EngineError::Other("nested record has no type name to select an alternative".into())))?;

        let matched = choices
            .alternatives
            .iter()
            .find(|a| a.type_name == type_name)
            .ok_or_else(|| self.field_err(template, &field.field_name, CodecError::NoAlternativeForValue.into()))?;

        if choices.prefix_size > 0 {
            let prefix = matched.prefix.unwrap_or(0);
            writer
                .write_uint(prefix, choices.prefix_size as usize, choices.prefix_byte_order)
                .map_err(|e| self.field_err(template, &field.field_name, e.into()))?;
        }

        let nested_template = self.templates.get(&type_name).map_err(|e| self.field_err(template, &field.field_name, e.into()))?;
        writer
            .write_text(&nested_template.header.start_bytes)
            .map_err(|e| self.field_err(template, &field.field_name, e.into()))?;

        let mut guard = ScopeGuard::push(stack, record.clone());
        self.encode_fields(nested_template, writer, guard.stack())?;
        guard.finish();
        Ok(())
    }

    fn write_checksum(&self, template: &Template, checksum_field: &BoundField, writer: &mut BitWriter, start: usize) -> Result<(), FieldError> {
        let (algorithm, byte_order, skip_start, skip_end, start_value) = match &checksum_field.binding {
            BindingSpec::Checksum { algorithm, byte_order, skip_start, skip_end, start_value } => (algorithm, *byte_order, *skip_start, *skip_end, *start_value),
            _ => unreachable!("checksum field must carry a Checksum binding"),
        };

        let checksummer = self
            .codecs
            .checksummer(algorithm)
            .ok_or_else(|| self.field_err(template, &checksum_field.field_name, EngineError::Other(format!("unknown checksum algorithm {algorithm:?}"))))?;

        let bytes_so_far = writer.flushed_bytes();
        let width_bytes = checksum_bit_width(algorithm).div_ceil(8);
        let end = bytes_so_far.len() + width_bytes;
        let effective_start = (start + skip_start).min(bytes_so_far.len());
        let effective_end = end.saturating_sub(skip_end).max(effective_start).min(bytes_so_far.len());
        let computed = checksummer.compute(bytes_so_far, effective_start, effective_end, start_value);

        let binding = BindingSpec::Checksum { algorithm: algorithm.clone(), byte_order, skip_start, skip_end, start_value };
        let scope_record = Record::anonymous();
        let scope = EvalScope { current: &scope_record, parent: None, root: None, context: Some(self.context) };
        self.codecs
            .codec(binding.kind_name())
            .map_err(EngineError::from)
            .and_then(|codec| codec.encode(writer, &binding, &Value::U64(computed), self.evaluator, &scope))
            .map_err(|e| self.field_err(template, &checksum_field.field_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::bits::ByteOrder;
    use crate::codec::CodecRegistry;
    use crate::evaluator::DefaultEvaluator;
    use crate::events::NullEventListener;
    use crate::field::{BoundFieldSpec, HeaderSpec, SchemaEntry};

    fn build_checksum_template() -> Template {
        let entries = vec![
            SchemaEntry::Bound(BoundFieldSpec {
                field_name: "a".into(),
                skip_before: vec![],
                condition: None,
                binding: BindingSpec::Byte { unsigned: true },
                validator: None,
                converter: None,
            }),
            SchemaEntry::Bound(BoundFieldSpec {
                field_name: "b".into(),
                skip_before: vec![],
                condition: None,
                binding: BindingSpec::Byte { unsigned: true },
                validator: None,
                converter: None,
            }),
            SchemaEntry::Bound(BoundFieldSpec {
                field_name: "crc".into(),
                skip_before: vec![],
                condition: None,
                binding: BindingSpec::Checksum {
                    algorithm: "sum16".into(),
                    byte_order: ByteOrder::BigEndian,
                    skip_start: 0,
                    skip_end: 2,
                    start_value: 0,
                },
                validator: None,
                converter: None,
            }),
        ];
        Template::compile("Frame", HeaderSpec::new(vec![0xAA]), entries).unwrap()
    }

    #[test]
    fn decode_then_encode_round_trips_a_simple_checksummed_message() {
        let template = build_checksum_template();
        let codecs = CodecRegistry::with_defaults();
        let evaluator = DefaultEvaluator::new();
        let templates = TemplateRegistry::new();
        let listener = NullEventListener;
        let context = GlobalContext::default();
        let engine = Engine { codecs: &codecs, evaluator: &evaluator, templates: &templates, listener: &listener, context: &context };

        let mut writer = BitWriter::new();
        writer.write_text(&[0xAA, 0x01, 0x02]).unwrap();
        writer.write_uint(0x03, 16, ByteOrder::BigEndian).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let record = engine.decode(&template, &mut reader).unwrap();
        assert_eq!(record.get("a"), Some(&Value::U64(1)));
        assert_eq!(record.get("b"), Some(&Value::U64(2)));

        let re_encoded = engine.encode(&template, &record).unwrap();
        assert_eq!(re_encoded, bytes);
    }

    #[test]
    fn decode_rejects_tampered_checksum() {
        let template = build_checksum_template();
        let codecs = CodecRegistry::with_defaults();
        let evaluator = DefaultEvaluator::new();
        let templates = TemplateRegistry::new();
        let listener = NullEventListener;
        let context = GlobalContext::default();
        let engine = Engine { codecs: &codecs, evaluator: &evaluator, templates: &templates, listener: &listener, context: &context };

        let bytes = [0xAA, 0x01, 0x02, 0x00, 0x00];
        let mut reader = BitReader::new(&bytes);
        let err = engine.decode(&template, &mut reader);
        assert!(err.is_err());
    }

    #[test]
    fn conditional_field_is_skipped_when_condition_is_false() {
        let entries = vec![
            SchemaEntry::Bound(BoundFieldSpec {
                field_name: "flag".into(),
                skip_before: vec![],
                condition: None,
                binding: BindingSpec::Byte { unsigned: true },
                validator: None,
                converter: None,
            }),
            SchemaEntry::Bound(BoundFieldSpec {
                field_name: "optional".into(),
                skip_before: vec![],
                condition: Some("self.flag == 1".into()),
                binding: BindingSpec::Byte { unsigned: true },
                validator: None,
                converter: None,
            }),
        ];
        let template = Template::compile("Opt", HeaderSpec::new(vec![0xAA]), entries).unwrap();

        let codecs = CodecRegistry::with_defaults();
        let evaluator = DefaultEvaluator::new();
        let templates = TemplateRegistry::new();
        let listener = NullEventListener;
        let context = GlobalContext::default();
        let engine = Engine { codecs: &codecs, evaluator: &evaluator, templates: &templates, listener: &listener, context: &context };

        let bytes = [0xAA, 0x00];
        let mut reader = BitReader::new(&bytes);
        let record = engine.decode(&template, &mut reader).unwrap();
        assert_eq!(record.get("flag"), Some(&Value::U64(0)));
        assert_eq!(record.get("optional"), Some(&Value::Unset));
    }
}

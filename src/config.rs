//! Configuration subsystem (component I, §4.7): protocol-version-aware
//! configuration schemas, distinct from message [`crate::template::Template`]s
//! but built from the same primitive/array-of-primitive vocabulary plus two
//! configuration-only shapes — composite fields (assembled from
//! sub-field defaults via [`crate::capabilities::Substitute`]) and
//! alternative fields (one of several protocol-range-gated variants).
//!
//! Three views are exposed through [`ConfigurationFacade`]:
//! - **View A** — every field, unfiltered, for administration tooling;
//! - **View B** — fields filtered to those whose protocol range covers a
//!   target [`ProtocolVersion`];
//! - **View C** — a materialized [`Record`] merging defaults with
//!   caller-supplied overrides, validated against each field's
//!   constraints.
//!
//! There is no precedent for this in the teacher (`bitcraft` has no
//! configuration concept at all); it is grounded entirely in the
//! `Substitute`/constraint vocabulary the design names in §4.7, built in
//! the teacher's validate-then-construct style (`Schema::compile`'s
//! eager-validation pattern, `crates/bitcraft/src/schema.rs`).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::capabilities::{BracePlaceholderSubstitute, Substitute};
use crate::datatype::parse_enum_literal;
use crate::errors::{ConfigurationError, EncodeError};
use crate::value::{Record, Value};

/// Expands a `|`-separated enum default into its `Value::Array` form
/// (§4.7 enum-default expansion); left untouched when the field has no
/// enumeration or the default isn't a bare string.
fn expand_enum_default(field_enumeration: &Option<Vec<Value>>, default: Value) -> Value {
    match (&field_enumeration, &default) {
        (Some(_), Value::Str(text)) => parse_enum_literal(text),
        _ => default,
    }
}

/// A three-component protocol version (`major.minor.patch`), compared
/// lexicographically on its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        ProtocolVersion { major, minor, patch }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut parts = text.trim().split('.');
        let major = parts.next().ok_or("missing major version")?.parse().map_err(|_| "invalid major version")?;
        let minor = parts.next().unwrap_or("0").parse().map_err(|_| "invalid minor version")?;
        let patch = parts.next().unwrap_or("0").parse().map_err(|_| "invalid patch version")?;
        Ok(ProtocolVersion { major, minor, patch })
    }
}

/// An inclusive `[min, max]` protocol range; either bound may be open.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolRange {
    pub min: Option<ProtocolVersion>,
    pub max: Option<ProtocolVersion>,
}

impl ProtocolRange {
    pub fn contains(&self, version: ProtocolVersion) -> bool {
        self.min.is_none_or(|min| version >= min) && self.max.is_none_or(|max| version <= max)
    }

    fn is_valid(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min.cmp(&max) != Ordering::Greater,
            _ => true,
        }
    }
}

/// A single primitive configuration value: a default, optional protocol
/// range, and at most one of {pattern, min/max, enumeration} (§4.7
/// "mutually exclusive constraints").
#[derive(Debug, Clone)]
pub struct ConfigurationField {
    pub field_name: String,
    pub short_description: String,
    pub long_description: Option<String>,
    pub default: Option<Value>,
    pub protocol_range: ProtocolRange,
    pub mandatory: bool,
    pub pattern: Option<String>,
    pub min_value: Option<Value>,
    pub max_value: Option<Value>,
    pub enumeration: Option<Vec<Value>>,
}

impl ConfigurationField {
    fn constraint_count(&self) -> usize {
        self.pattern.is_some() as usize + (self.min_value.is_some() || self.max_value.is_some()) as usize + self.enumeration.is_some() as usize
    }

    /// Checks `value` against this field's declared constraints (§4.7
    /// validated overrides).
    pub fn validate(&self, value: &Value) -> Result<(), EncodeError> {
        if let Some(pattern) = &self.pattern {
            let text = value.as_str().unwrap_or_default();
            if !glob_matches(pattern, text) {
                return Err(EncodeError::PatternMismatch(self.field_name.clone()));
            }
        }
        if self.min_value.is_some() || self.max_value.is_some() {
            let number = value.as_f64().ok_or_else(|| EncodeError::OutOfRange {
                field: self.field_name.clone(),
                min: self.min_value.as_ref().map(ToString::to_string).unwrap_or_default(),
                max: self.max_value.as_ref().map(ToString::to_string).unwrap_or_default(),
            })?;
            let below_min = self.min_value.as_ref().and_then(Value::as_f64).is_some_and(|min| number < min);
            let above_max = self.max_value.as_ref().and_then(Value::as_f64).is_some_and(|max| number > max);
            if below_min || above_max {
                return Err(EncodeError::OutOfRange {
                    field: self.field_name.clone(),
                    min: self.min_value.as_ref().map(ToString::to_string).unwrap_or_default(),
                    max: self.max_value.as_ref().map(ToString::to_string).unwrap_or_default(),
                });
            }
        }
        if let Some(allowed) = &self.enumeration {
            let in_enumeration = match value {
                Value::Array(items) => items.iter().all(|item| allowed.contains(item)),
                other => allowed.contains(other),
            };
            if !in_enumeration {
                return Err(EncodeError::NotInEnumeration(self.field_name.clone()));
            }
        }
        Ok(())
    }
}

/// A field assembled from a template string and named sub-fields, each
/// with its own default, via [`Substitute`] (§4.7 "composite field
/// encoding").
#[derive(Debug, Clone)]
pub struct CompositeConfigurationField {
    pub field_name: String,
    pub short_description: String,
    pub composition: String,
    pub sub_fields: Vec<ConfigurationField>,
    pub protocol_range: ProtocolRange,
}

impl CompositeConfigurationField {
    pub fn materialize(&self, substitute: &dyn Substitute, overrides: &HashMap<String, Value>) -> String {
        let mut bindings = HashMap::new();
        for sub in &self.sub_fields {
            let value = overrides.get(&sub.field_name).or(sub.default.as_ref());
            if let Some(value) = value {
                bindings.insert(sub.short_description.clone(), value.to_string());
            }
        }
        substitute.substitute(&self.composition, &bindings)
    }
}

/// One of several mutually exclusive [`ConfigurationField`] variants,
/// selected by which variant's protocol range covers the target version
/// (§4.7 "AlternativeConfigurationField").
#[derive(Debug, Clone)]
pub struct AlternativeConfigurationField {
    pub field_name: String,
    pub short_description: String,
    pub alternatives: Vec<ConfigurationField>,
}

impl AlternativeConfigurationField {
    pub fn select(&self, version: ProtocolVersion) -> Option<&ConfigurationField> {
        self.alternatives.iter().find(|a| a.protocol_range.contains(version))
    }
}

/// One entry in a [`Configuration`] schema.
#[derive(Debug, Clone)]
pub enum ConfigurationEntry {
    Primitive(ConfigurationField),
    Composite(CompositeConfigurationField),
    Alternative(AlternativeConfigurationField),
}

impl ConfigurationEntry {
    pub fn field_name(&self) -> &str {
        match self {
            ConfigurationEntry::Primitive(f) => &f.field_name,
            ConfigurationEntry::Composite(f) => &f.field_name,
            ConfigurationEntry::Alternative(f) => &f.field_name,
        }
    }

    fn short_description(&self) -> &str {
        match self {
            ConfigurationEntry::Primitive(f) => &f.short_description,
            ConfigurationEntry::Composite(f) => &f.short_description,
            ConfigurationEntry::Alternative(f) => &f.short_description,
        }
    }

    fn protocol_range(&self) -> Option<ProtocolRange> {
        match self {
            ConfigurationEntry::Primitive(f) => Some(f.protocol_range),
            ConfigurationEntry::Composite(f) => Some(f.protocol_range),
            ConfigurationEntry::Alternative(_) => None,
        }
    }
}

/// A named configuration schema: an ordered set of [`ConfigurationEntry`]s.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub type_name: String,
    pub entries: Vec<ConfigurationEntry>,
}

fn validate_configuration(configuration: &Configuration) -> Result<(), ConfigurationError> {
    let mut seen_descriptions = std::collections::HashSet::new();
    for entry in &configuration.entries {
        if !seen_descriptions.insert(entry.short_description().to_string()) {
            return Err(ConfigurationError::DuplicateShortDescription(entry.short_description().to_string()));
        }
        if let Some(range) = entry.protocol_range() {
            if !range.is_valid() {
                return Err(ConfigurationError::InvalidProtocolRange(entry.field_name().to_string()));
            }
        }
        if let ConfigurationEntry::Primitive(field) = entry {
            if field.constraint_count() > 1 {
                return Err(ConfigurationError::MutuallyExclusiveConstraints(field.field_name.clone()));
            }
            match &field.default {
                Some(default) => {
                    let expanded = expand_enum_default(&field.enumeration, default.clone());
                    field.validate(&expanded).map_err(|_| ConfigurationError::DefaultViolatesConstraints(field.field_name.clone()))?
                }
                None if field.mandatory => {}
                None => return Err(ConfigurationError::PrimitiveFieldMissingDefault(field.field_name.clone())),
            }
        }
    }
    Ok(())
}

/// Holds every registered [`Configuration`] schema, keyed by type name.
pub struct ConfigurationRegistry {
    by_type_name: HashMap<String, Configuration>,
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        ConfigurationRegistry { by_type_name: HashMap::new() }
    }

    pub fn register(&mut self, configuration: Configuration) -> Result<(), ConfigurationError> {
        validate_configuration(&configuration)?;
        self.by_type_name.insert(configuration.type_name.clone(), configuration);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&Configuration> {
        self.by_type_name.get(type_name)
    }
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Projects a [`Configuration`] into its three views (§4.7).
pub struct ConfigurationFacade<'a> {
    registry: &'a ConfigurationRegistry,
    substitute: BracePlaceholderSubstitute,
}

impl<'a> ConfigurationFacade<'a> {
    pub fn new(registry: &'a ConfigurationRegistry) -> Self {
        ConfigurationFacade { registry, substitute: BracePlaceholderSubstitute }
    }

    /// View A: every field, unfiltered.
    pub fn view_a(&self, type_name: &str) -> Option<&'a [ConfigurationEntry]> {
        self.registry.get(type_name).map(|c| c.entries.as_slice())
    }

    /// View B: only fields whose protocol range covers `version`
    /// (alternative fields always pass, since they resolve their own
    /// range per-variant in `view_c`).
    pub fn view_b(&self, type_name: &str, version: ProtocolVersion) -> Option<Vec<&'a ConfigurationEntry>> {
        let configuration = self.registry.get(type_name)?;
        Some(
            configuration
                .entries
                .iter()
                .filter(|entry| entry.protocol_range().is_none_or(|range| range.contains(version)))
                .collect(),
        )
    }

    /// View C: a materialized [`Record`] combining defaults with
    /// `overrides`, validating every override against its field's
    /// constraints.
    pub fn view_c(&self, type_name: &str, version: ProtocolVersion, overrides: &HashMap<String, Value>) -> Result<Record, ConfigurationError> {
        let configuration = self.registry.get(type_name).ok_or_else(|| ConfigurationError::NotAConfiguration(type_name.to_string()))?;
        let mut record = Record::new(type_name);

        for entry in &configuration.entries {
            match entry {
                ConfigurationEntry::Primitive(field) => {
                    if !field.protocol_range.contains(version) {
                        continue;
                    }
                    let value = match overrides.get(&field.field_name) {
                        Some(value) => {
                            field.validate(value)?;
                            value.clone()
                        }
                        None => match field.default.clone() {
                            Some(default) => expand_enum_default(&field.enumeration, default),
                            None if field.mandatory => {
                                return Err(crate::errors::EncodeError::MandatoryMissing(field.field_name.clone()).into());
                            }
                            None => return Err(ConfigurationError::PrimitiveFieldMissingDefault(field.field_name.clone())),
                        },
                    };
                    record.set(field.field_name.clone(), value);
                }
                ConfigurationEntry::Composite(field) => {
                    if !field.protocol_range.contains(version) {
                        continue;
                    }
                    let materialized = field.materialize(&self.substitute, overrides);
                    record.set(field.field_name.clone(), Value::Str(materialized));
                }
                ConfigurationEntry::Alternative(field) => {
                    if let Some(selected) = field.select(version) {
                        let value = match overrides.get(&field.field_name) {
                            Some(value) => {
                                selected.validate(value)?;
                                value.clone()
                            }
                            None => match selected.default.clone() {
                                Some(default) => expand_enum_default(&selected.enumeration, default),
                                None if selected.mandatory => {
                                    return Err(crate::errors::EncodeError::MandatoryMissing(selected.field_name.clone()).into());
                                }
                                None => return Err(ConfigurationError::PrimitiveFieldMissingDefault(selected.field_name.clone())),
                            },
                        };
                        record.set(field.field_name.clone(), value);
                    }
                }
            }
        }

        Ok(record)
    }
}

/// A small `*`-wildcard matcher (no regex dependency is carried by any
/// example in the pack, so patterns stay deliberately simple: `*` matches
/// any run of characters, everything else is literal).
fn glob_matches(pattern: &str, text: &str) -> bool {
    fn helper(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => (0..=text.len()).any(|i| helper(&pattern[1..], &text[i..])),
            Some(&p) => text.first().is_some_and(|&t| t == p) && helper(&pattern[1..], &text[1..]),
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

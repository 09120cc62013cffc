//! Serde-deserializable schema definitions (optional `serde` feature),
//! mirroring the teacher's `SchemaDef`/`FieldDef`/`FieldKindDef`
//! (`crates/bitcraft/src/serde.rs`) but generalized from the teacher's flat
//! scalar/array split to the full [`crate::binding::BindingSpec`] lattice,
//! so a schema can be authored as JSON/YAML instead of built up in Rust.

use std::collections::HashMap;

use serde::Deserialize;

use crate::binding::{Alternative, BindingSpec, Charset, ConverterChoices, DecimalClass, ObjectChoices};
use crate::bits::ByteOrder;
use crate::errors::AnnotationError;
use crate::field::{BoundFieldSpec, EvaluatedFieldSpec, HeaderSpec, SchemaEntry, SkipSpec};
use crate::template::Template;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    pub type_name: String,
    pub header: Vec<u8>,
    pub entries: Vec<SchemaEntryDef>,
}

impl SchemaDef {
    pub fn compile(self) -> Result<Template, AnnotationError> {
        let entries = self.entries.into_iter().map(SchemaEntryDef::into_entry).collect();
        Template::compile(self.type_name, HeaderSpec::new(self.header), entries)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "entryKind")]
pub enum SchemaEntryDef {
    Bound(BoundFieldDef),
    Evaluated(EvaluatedFieldDef),
}

impl SchemaEntryDef {
    fn into_entry(self) -> SchemaEntry {
        match self {
            SchemaEntryDef::Bound(def) => SchemaEntry::Bound(def.into_spec()),
            SchemaEntryDef::Evaluated(def) => SchemaEntry::Evaluated(EvaluatedFieldSpec {
                field_name: def.field_name,
                value_expr: def.value,
                condition: def.condition,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundFieldDef {
    pub field_name: String,
    #[serde(default)]
    pub skip_bits: Vec<u32>,
    #[serde(default)]
    pub condition: Option<String>,
    pub binding: BindingDef,
    #[serde(default)]
    pub validator: Option<String>,
    #[serde(default)]
    pub converter: Option<String>,
}

impl BoundFieldDef {
    fn into_spec(self) -> BoundFieldSpec {
        BoundFieldSpec {
            field_name: self.field_name,
            skip_before: self.skip_bits.into_iter().map(SkipSpec::Bits).collect(),
            condition: self.condition,
            binding: self.binding.into_spec(),
            validator: self.validator,
            converter: self.converter.map(ConverterChoices::single),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedFieldDef {
    pub field_name: String,
    pub value: String,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrderDef {
    Big,
    Little,
}

impl From<ByteOrderDef> for ByteOrder {
    fn from(value: ByteOrderDef) -> Self {
        match value {
            ByteOrderDef::Big => ByteOrder::BigEndian,
            ByteOrderDef::Little => ByteOrder::LittleEndian,
        }
    }
}

impl Default for ByteOrderDef {
    fn default() -> Self {
        ByteOrderDef::Big
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CharsetDef {
    Utf8,
    Ascii,
}

impl From<CharsetDef> for Charset {
    fn from(value: CharsetDef) -> Self {
        match value {
            CharsetDef::Utf8 => Charset::Utf8,
            CharsetDef::Ascii => Charset::Ascii,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DecimalClassDef {
    Float,
    Double,
}

impl From<DecimalClassDef> for DecimalClass {
    fn from(value: DecimalClassDef) -> Self {
        match value {
            DecimalClassDef::Float => DecimalClass::Float,
            DecimalClassDef::Double => DecimalClass::Double,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BindingDef {
    Bool,
    Byte {
        #[serde(default)]
        unsigned: bool,
    },
    Short {
        #[serde(default)]
        byte_order: ByteOrderDef,
        #[serde(default)]
        unsigned: bool,
    },
    Int {
        #[serde(default)]
        byte_order: ByteOrderDef,
        #[serde(default)]
        unsigned: bool,
    },
    Long {
        #[serde(default)]
        byte_order: ByteOrderDef,
        #[serde(default)]
        unsigned: bool,
    },
    BigInteger {
        size: String,
        #[serde(default)]
        byte_order: ByteOrderDef,
        #[serde(default)]
        unsigned: bool,
    },
    Float {
        #[serde(default)]
        byte_order: ByteOrderDef,
    },
    Double {
        #[serde(default)]
        byte_order: ByteOrderDef,
    },
    BigDecimal {
        #[serde(default)]
        byte_order: ByteOrderDef,
        class: DecimalClassDef,
    },
    String {
        size: String,
        #[serde(default)]
        charset: CharsetDefOrDefault,
    },
    StringTerminated {
        terminator: Vec<u8>,
        #[serde(default)]
        consume_terminator: bool,
        #[serde(default)]
        charset: CharsetDefOrDefault,
    },
    ArrayPrimitive {
        count: String,
        element: Box<BindingDef>,
    },
    ArrayObject {
        count: String,
        choices: ObjectChoicesDef,
    },
    Object {
        choices: ObjectChoicesDef,
    },
    Checksum {
        algorithm: String,
        #[serde(default)]
        byte_order: ByteOrderDef,
        #[serde(default)]
        skip_start: usize,
        #[serde(default)]
        skip_end: usize,
        #[serde(default)]
        start_value: u64,
    },
}

/// Wraps [`CharsetDef`] with a UTF-8 default, since `#[serde(default)]`
/// requires `Default` and a bare enum default would be arbitrary.
#[derive(Debug, Clone, Copy)]
pub struct CharsetDefOrDefault(pub CharsetDef);

impl Default for CharsetDefOrDefault {
    fn default() -> Self {
        CharsetDefOrDefault(CharsetDef::Utf8)
    }
}

impl<'de> Deserialize<'de> for CharsetDefOrDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        CharsetDef::deserialize(deserializer).map(CharsetDefOrDefault)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeDef {
    pub type_name: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub prefix: Option<u64>,
}

impl From<AlternativeDef> for Alternative {
    fn from(value: AlternativeDef) -> Self {
        Alternative { type_name: value.type_name, condition: value.condition, prefix: value.prefix }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChoicesDef {
    #[serde(default)]
    pub prefix_size: u32,
    #[serde(default)]
    pub prefix_byte_order: ByteOrderDef,
    pub alternatives: Vec<AlternativeDef>,
}

impl From<ObjectChoicesDef> for ObjectChoices {
    fn from(value: ObjectChoicesDef) -> Self {
        ObjectChoices {
            prefix_size: value.prefix_size,
            prefix_byte_order: value.prefix_byte_order.into(),
            alternatives: value.alternatives.into_iter().map(Alternative::from).collect(),
        }
    }
}

impl BindingDef {
    fn into_spec(self) -> BindingSpec {
        match self {
            BindingDef::Bool => BindingSpec::Bool,
            BindingDef::Byte { unsigned } => BindingSpec::Byte { unsigned },
            BindingDef::Short { byte_order, unsigned } => BindingSpec::Short { byte_order: byte_order.into(), unsigned },
            BindingDef::Int { byte_order, unsigned } => BindingSpec::Int { byte_order: byte_order.into(), unsigned },
            BindingDef::Long { byte_order, unsigned } => BindingSpec::Long { byte_order: byte_order.into(), unsigned },
            BindingDef::BigInteger { size, byte_order, unsigned } => BindingSpec::BigInteger { size, byte_order: byte_order.into(), unsigned },
            BindingDef::Float { byte_order } => BindingSpec::Float { byte_order: byte_order.into() },
            BindingDef::Double { byte_order } => BindingSpec::Double { byte_order: byte_order.into() },
            BindingDef::BigDecimal { byte_order, class } => BindingSpec::BigDecimal { byte_order: byte_order.into(), class: class.into() },
            BindingDef::String { size, charset } => BindingSpec::StringFixed { size, charset: charset.0.into() },
            BindingDef::StringTerminated { terminator, consume_terminator, charset } => {
                BindingSpec::StringTerminated { terminator, consume_terminator, charset: charset.0.into() }
            }
            BindingDef::ArrayPrimitive { count, element } => BindingSpec::ArrayPrimitive { count, element: Box::new(element.into_spec()) },
            BindingDef::ArrayObject { count, choices } => BindingSpec::ArrayObject { count, choices: choices.into() },
            BindingDef::Object { choices } => BindingSpec::Object { choices: choices.into() },
            BindingDef::Checksum { algorithm, byte_order, skip_start, skip_end, start_value } => {
                BindingSpec::Checksum { algorithm, byte_order: byte_order.into(), skip_start, skip_end, start_value }
            }
        }
    }
}

/// Placeholder for a future JSON/YAML configuration schema loader;
/// currently schemas are defined in Rust (see [`crate::config`]). A host
/// wanting JSON-defined configurations can deserialize into
/// `HashMap<String, serde_json::Value>` and hand-build [`crate::config::Configuration`]
/// entries from it the same way `SchemaDef::compile` builds a `Template`.
pub type RawJsonSchema = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_minimal_schema_and_compiles_it() {
        let json = r#"
        {
            "typeName": "Ping",
            "header": [170],
            "entries": [
                { "entryKind": "bound", "fieldName": "value", "binding": { "kind": "byte", "unsigned": true } }
            ]
        }
        "#;
        let def: SchemaDef = serde_json::from_str(json).unwrap();
        let template = def.compile().unwrap();
        assert_eq!(template.type_name, "Ping");
        assert_eq!(template.bound_fields.len(), 1);
    }
}

//! Cross-module integration scenarios (spec §8 "Concrete scenarios").
//!
//! Each test builds a [`Template`]/[`Parser`] the way a host application
//! would — through the public builder API — and exercises a full
//! decode/encode round trip, not a single module in isolation.

use bitcraft::binding::{Alternative, BindingSpec, Charset, ObjectChoices};
use bitcraft::bits::ByteOrder;
use bitcraft::field::{BoundFieldSpec, HeaderSpec, SchemaEntry};
use bitcraft::{Parser, ParserBuilder, Record, Template, Value};

fn bound(name: &str, binding: BindingSpec) -> SchemaEntry {
    SchemaEntry::Bound(BoundFieldSpec {
        field_name: name.into(),
        skip_before: vec![],
        condition: None,
        binding,
        validator: None,
        converter: None,
    })
}

/// S1 — primitive round trip. The literal scenario has no header byte;
/// this engine's templates always frame a message with a header (component
/// D), so a one-byte marker is prefixed and included in the expected wire
/// bytes below.
#[test]
fn s1_primitive_round_trip() {
    let entries = vec![
        bound("magic", BindingSpec::Int { byte_order: ByteOrder::LittleEndian, unsigned: true }),
        bound("version", BindingSpec::Byte { unsigned: true }),
    ];
    let template = Template::compile("Greeting", HeaderSpec::new(vec![0xFE]), entries).unwrap();
    let parser = ParserBuilder::new().add_template(template).unwrap().build();

    let record = Record::new("Greeting").with("magic", Value::U64(0xDEADBEEF)).with("version", Value::U64(7));
    let composed = parser.compose(&[("Greeting".to_string(), record)]);
    assert!(composed.errors.is_empty());
    assert_eq!(composed.bytes, vec![0xFE, 0xEF, 0xBE, 0xAD, 0xDE, 0x07]);

    let parsed = parser.parse(&composed.bytes);
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.parsed.len(), 1);
    let record = &parsed.parsed[0].record;
    assert_eq!(record.get("magic"), Some(&Value::U64(0xDEADBEEF)));
    assert_eq!(record.get("version"), Some(&Value::U64(7)));
}

/// S2 (adapted) — variant discrimination by prefix. This engine recurses
/// into the chosen alternative's own [`Template`] (its own header bytes
/// included), rather than the literal spec's headerless nested payload, so
/// each alternative carries a one-byte marker distinguishing it from its
/// siblings in addition to the discriminant prefix.
#[test]
fn s2_variant_selection_by_prefix() {
    let variant_a = Template::compile(
        "VariantA",
        HeaderSpec::new(vec![0x10]),
        vec![bound("payload", BindingSpec::Short { byte_order: ByteOrder::BigEndian, unsigned: true })],
    )
    .unwrap();
    let variant_b = Template::compile(
        "VariantB",
        HeaderSpec::new(vec![0x20]),
        vec![bound("payload", BindingSpec::Byte { unsigned: true })],
    )
    .unwrap();

    let choices = ObjectChoices {
        prefix_size: 8,
        prefix_byte_order: ByteOrder::BigEndian,
        alternatives: vec![
            Alternative { type_name: "VariantA".into(), condition: Some("self.prefix == 1".into()), prefix: Some(1) },
            Alternative { type_name: "VariantB".into(), condition: Some("self.prefix == 2".into()), prefix: Some(2) },
        ],
    };
    let wrapper = Template::compile("Wrapper", HeaderSpec::new(vec![0xAA]), vec![bound("body", BindingSpec::Object { choices })]).unwrap();

    let parser = ParserBuilder::new()
        .add_template(wrapper)
        .unwrap()
        .add_template(variant_a)
        .unwrap()
        .add_template(variant_b)
        .unwrap()
        .build();

    // AA (wrapper header) 01 (prefix=1) 10 (VariantA header) 00 42 (payload)
    let bytes_a = [0xAA, 0x01, 0x10, 0x00, 0x42];
    let response = parser.parse(&bytes_a);
    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors.iter().map(|e| e.error.to_string()).collect::<Vec<_>>());
    let body = response.parsed[0].record.get("body").unwrap().as_object().unwrap();
    assert_eq!(body.type_name.as_deref(), Some("VariantA"));
    assert_eq!(body.get("payload"), Some(&Value::U64(0x0042)));

    // AA (wrapper header) 02 (prefix=2) 20 (VariantB header) 10 (payload)
    let bytes_b = [0xAA, 0x02, 0x20, 0x10];
    let response_b = parser.parse(&bytes_b);
    assert!(response_b.errors.is_empty());
    let body_b = response_b.parsed[0].record.get("body").unwrap().as_object().unwrap();
    assert_eq!(body_b.type_name.as_deref(), Some("VariantB"));
    assert_eq!(body_b.get("payload"), Some(&Value::U64(0x10)));
}

/// S3 — skip then field. `skip 4 bits; uint4 x` packs into a single byte
/// with the skip filling the high nibble. Arbitrary sub-byte widths go
/// through `BigInteger` (§4.1), the only binding kind with an explicit
/// bit-length expression.
#[test]
fn s3_skip_then_field_packs_into_one_byte() {
    use bitcraft::field::SkipSpec;

    let entries = vec![SchemaEntry::Bound(BoundFieldSpec {
        field_name: "x".into(),
        skip_before: vec![SkipSpec::Bits(4)],
        condition: None,
        binding: BindingSpec::BigInteger { size: "4".into(), byte_order: ByteOrder::BigEndian, unsigned: true },
        validator: None,
        converter: None,
    })];
    let template = Template::compile("Nibble", HeaderSpec::new(vec![0xAA]), entries).unwrap();
    let parser = ParserBuilder::new().add_template(template).unwrap().build();

    let bytes = [0xAA, 0x05];
    let response = parser.parse(&bytes);
    assert!(response.errors.is_empty());
    let x = response.parsed[0].record.get("x").unwrap();
    match x {
        Value::BigInt(b) => assert_eq!(b.to_i64(), Some(5)),
        other => panic!("expected BigInt, got {other:?}"),
    }
}

/// S4 — null-terminated string followed by a trailer byte.
#[test]
fn s4_null_terminated_string_then_trailer() {
    let entries = vec![
        bound(
            "s",
            BindingSpec::StringTerminated { terminator: vec![0x00], consume_terminator: true, charset: Charset::Utf8 },
        ),
        bound("trailer", BindingSpec::Byte { unsigned: true }),
    ];
    let template = Template::compile("Greeting", HeaderSpec::new(vec![0xAA]), entries).unwrap();
    let parser = ParserBuilder::new().add_template(template).unwrap().build();

    let mut bytes = vec![0xAA];
    bytes.extend_from_slice(b"HI\x00\x42");
    let response = parser.parse(&bytes);
    assert!(response.errors.is_empty());
    let record = &response.parsed[0].record;
    assert_eq!(record.get("s"), Some(&Value::Str("HI".to_string())));
    assert_eq!(record.get("trailer"), Some(&Value::U64(0x42)));
}

/// S5 — checksum soundness. Header `AA BB`, a four-byte payload, and a
/// trailing `sum16` checksum over exactly the payload bytes.
#[test]
fn s5_checksum_accepted_then_rejected_after_tamper() {
    let entries = vec![
        bound(
            "payload",
            BindingSpec::ArrayPrimitive { count: "4".into(), element: Box::new(BindingSpec::Byte { unsigned: true }) },
        ),
        bound(
            "crc",
            BindingSpec::Checksum { algorithm: "sum16".into(), byte_order: ByteOrder::BigEndian, skip_start: 0, skip_end: 2, start_value: 0 },
        ),
    ];
    let template = Template::compile("Frame", HeaderSpec::new(vec![0xAA, 0xBB]), entries).unwrap();
    let parser = ParserBuilder::new().add_template(template).unwrap().build();

    let good = [0xAA, 0xBB, 0x01, 0x02, 0x03, 0x04, 0x00, 0x0A];
    let response = parser.parse(&good);
    assert!(response.errors.is_empty(), "expected a clean decode, got {:?}", response.errors.iter().map(|e| e.error.to_string()).collect::<Vec<_>>());
    let payload = response.parsed[0].record.get("payload").unwrap().as_array().unwrap();
    assert_eq!(payload, &[Value::U64(1), Value::U64(2), Value::U64(3), Value::U64(4)]);

    for index in 2..6 {
        let mut tampered = good;
        tampered[index] ^= 0x01;
        let response = parser.parse(&tampered);
        assert_eq!(response.errors.len(), 1, "byte {index} flip should have raised a checksum error");
    }
}

/// S6 — resync past a corrupt frame. Template `A` (header `AA`) fails to
/// decode from truncated/misaligned bytes; the parser resynchronizes to
/// the next registered header (`BB`) rather than aborting the whole
/// buffer, and reports exactly one error with no trailing-bytes error.
#[test]
fn s6_resync_past_corrupt_frame() {
    let template_a =
        Template::compile("A", HeaderSpec::new(vec![0xAA]), vec![bound("value", BindingSpec::Int { byte_order: ByteOrder::BigEndian, unsigned: true })]).unwrap();
    let template_b = Template::compile("B", HeaderSpec::new(vec![0xBB]), vec![bound("value", BindingSpec::Byte { unsigned: true })]).unwrap();

    let parser = ParserBuilder::new().add_template(template_a).unwrap().add_template(template_b).unwrap().build();

    // AA starts template A (which needs a 4-byte int) but only one byte of
    // body is available before BB's valid frame begins.
    let bytes = [0xAA, 0x00, 0xBB, 0x05];
    let response = parser.parse(&bytes);

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].offset, 0);
    assert_eq!(response.parsed.len(), 1);
    assert_eq!(response.parsed[0].type_name, "B");
    assert_eq!(response.parsed[0].record.get("value"), Some(&Value::U64(5)));
}

/// Property #9 (protocol filter) exercised end to end through the
/// configuration facade, complementing the unit tests in `src/config.rs`.
#[test]
fn configuration_view_b_filters_fields_by_protocol_range() {
    use bitcraft::config::{Configuration, ConfigurationEntry, ConfigurationField, ProtocolRange, ProtocolVersion};

    let configuration = Configuration {
        type_name: "Device".into(),
        entries: vec![
            ConfigurationEntry::Primitive(ConfigurationField {
                field_name: "legacyMode".into(),
                short_description: "legacy".into(),
                long_description: None,
                default: Some(Value::Bool(false)),
                protocol_range: ProtocolRange { min: None, max: Some(ProtocolVersion::new(1, 9, 9)) },
                mandatory: false,
                pattern: None,
                min_value: None,
                max_value: None,
                enumeration: None,
            }),
            ConfigurationEntry::Primitive(ConfigurationField {
                field_name: "fastPath".into(),
                short_description: "fast".into(),
                long_description: None,
                default: Some(Value::Bool(true)),
                protocol_range: ProtocolRange { min: Some(ProtocolVersion::new(2, 0, 0)), max: None },
                mandatory: false,
                pattern: None,
                min_value: None,
                max_value: None,
                enumeration: None,
            }),
        ],
    };

    let parser = ParserBuilder::new().add_configuration(configuration).unwrap().build();
    let facade = parser.configuration_facade();

    let old = facade.view_b("Device", ProtocolVersion::new(1, 0, 0)).unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].field_name(), "legacyMode");

    let new = facade.view_b("Device", ProtocolVersion::new(2, 5, 0)).unwrap();
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].field_name(), "fastPath");
}

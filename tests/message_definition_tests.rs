mod test_shared;

use dynamav::{BaseType, MessageSet, ParseError, HEADER_SIZE};

const BIG_MESSAGE_XML: &str = r#"
<mavlink>
    <messages>
        <message id="9915" name="BIG_MESSAGE">
            <field type="uint8_t" name="uint8_field">description</field>
            <field type="int8_t" name="int8_field">description</field>
            <field type="uint16_t" name="uint16_field">description</field>
            <field type="int16_t" name="int16_field">description</field>
            <field type="uint32_t" name="uint32_field">description</field>
            <field type="int32_t" name="int32_field">description</field>
            <field type="uint64_t" name="uint64_field">description</field>
            <field type="int64_t" name="int64_field">description</field>
            <field type="double" name="double_field">description</field>
            <field type="float" name="float_field">description</field>
            <field type="char[20]" name="char_arr_field">description</field>
            <field type="float[3]" name="float_arr_field">description</field>
            <field type="int32_t[3]" name="int32_arr_field">description</field>
            <extensions/>
            <field type="uint8_t" name="extension_uint8_field">description</field>
        </message>
    </messages>
</mavlink>
"#;

fn big_message_set() -> MessageSet {
    let mut set = MessageSet::new();
    set.load_str(BIG_MESSAGE_XML).unwrap();
    set
}

#[test]
fn definition_getters() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    assert_eq!(definition.name(), "BIG_MESSAGE");
    assert_eq!(definition.id(), 9915);
    assert_eq!(definition.field_count(), 14);
    assert_eq!(definition.field_names().count(), 14);
}

#[test]
fn mavlink_wire_spec_values() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    assert_eq!(definition.max_buffer_length(), 112);
    assert_eq!(definition.max_payload_length(), 87);
    assert_eq!(definition.crc_extra(), 0x59);
}

#[test]
fn field_types_resolve() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    let base_type =
        |name: &str| definition.field(name).unwrap().field_type.base_type;
    let array_size =
        |name: &str| definition.field(name).unwrap().field_type.array_size;

    assert_eq!(base_type("uint8_field"), BaseType::UInt8);
    assert_eq!(base_type("int8_field"), BaseType::Int8);
    assert_eq!(base_type("uint16_field"), BaseType::UInt16);
    assert_eq!(base_type("int16_field"), BaseType::Int16);
    assert_eq!(base_type("uint32_field"), BaseType::UInt32);
    assert_eq!(base_type("int32_field"), BaseType::Int32);
    assert_eq!(base_type("uint64_field"), BaseType::UInt64);
    assert_eq!(base_type("int64_field"), BaseType::Int64);
    assert_eq!(base_type("double_field"), BaseType::Double);
    assert_eq!(base_type("float_field"), BaseType::Float);
    assert_eq!(base_type("char_arr_field"), BaseType::Char);
    assert_eq!(array_size("char_arr_field"), 20);
    assert_eq!(array_size("float_arr_field"), 3);
    assert_eq!(array_size("int32_arr_field"), 3);
    assert_eq!(array_size("uint8_field"), 1);
}

#[test]
fn offsets_follow_size_descending_sort() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    let offset = |name: &str| definition.field(name).unwrap().offset;

    // 8-byte fields first, in declaration order
    assert_eq!(offset("uint64_field"), HEADER_SIZE);
    assert_eq!(offset("int64_field"), HEADER_SIZE + 8);
    assert_eq!(offset("double_field"), HEADER_SIZE + 16);
    // 4-byte fields, declaration order preserved among equals
    assert_eq!(offset("uint32_field"), HEADER_SIZE + 24);
    assert_eq!(offset("int32_field"), HEADER_SIZE + 28);
    assert_eq!(offset("float_field"), HEADER_SIZE + 32);
    assert_eq!(offset("float_arr_field"), HEADER_SIZE + 36);
    assert_eq!(offset("int32_arr_field"), HEADER_SIZE + 48);
    // 2-byte fields
    assert_eq!(offset("uint16_field"), HEADER_SIZE + 60);
    assert_eq!(offset("int16_field"), HEADER_SIZE + 62);
    // 1-byte fields
    assert_eq!(offset("uint8_field"), HEADER_SIZE + 64);
    assert_eq!(offset("int8_field"), HEADER_SIZE + 65);
    assert_eq!(offset("char_arr_field"), HEADER_SIZE + 66);
    // extension field comes last even though it is tiny
    assert_eq!(offset("extension_uint8_field"), HEADER_SIZE + 86);

    // every non-extension field sits below every extension field
    for (name, field) in definition.fields() {
        if definition.is_extension_field(name) {
            continue;
        }
        assert!(field.offset < offset("extension_uint8_field"));
    }
}

#[test]
fn fields_iterate_in_offset_order() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    let offsets: Vec<usize> = definition.fields().map(|(_, field)| field.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
}

#[test]
fn contains_field_lookups() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();

    assert!(definition.contains_field("uint8_field"));
    assert!(definition.contains_field("extension_uint8_field"));
    assert!(!definition.contains_field("non_existing_field"));
    assert!(definition.field("non_existing_field").is_none());
}

#[test]
fn extension_fields_marked_and_excluded_from_crc() {
    let set = big_message_set();
    let definition = set.definition("BIG_MESSAGE").unwrap();
    assert!(definition.is_extension_field("extension_uint8_field"));
    assert!(!definition.is_extension_field("char_arr_field"));

    // same message without the extension field keeps the fingerprint
    let without_extension = BIG_MESSAGE_XML
        .replace(r#"<field type="uint8_t" name="extension_uint8_field">description</field>"#, "")
        .replace("<extensions/>", "");
    let mut set = MessageSet::new();
    set.load_str(&without_extension).unwrap();
    assert_eq!(set.definition("BIG_MESSAGE").unwrap().crc_extra(), 0x59);
}

#[test]
fn duplicate_field_names_rejected() {
    let mut set = MessageSet::new();
    let result = set.load_str(
        r#"
        <mavlink>
            <messages>
                <message id="1" name="BROKEN">
                    <field type="uint8_t" name="x">a</field>
                    <field type="uint16_t" name="x">b</field>
                </message>
            </messages>
        </mavlink>
        "#,
    );
    assert!(matches!(result, Err(ParseError::DuplicateField { .. })));
}

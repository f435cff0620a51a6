mod common;

use std::rc::Rc;

use rblock::{
    is_unknown_field, BlockError, BlockRef, ContainerContext, CountProvider, DataBlockReader,
    ReadDirection, ReaderConfig, SizeProvider,
};
use rcore::{
    BlockId, ByteOrder, FieldFunction, FieldType, Interpreted, MagicKey, MediumError,
    SpecificationBuilder,
};

use common::*;

#[test]
fn encoding_taken_from_an_earlier_field() {
    let mut b = SpecificationBuilder::new("c");
    b.container("c");
    b.field_payload("c.payload");
    b.field("c.payload.encoding", FieldType::String)
        .fixed(8)
        .add_function(FieldFunction::CharacterEncodingOf(vec![BlockId::new(
            "c",
            "c.payload.name",
        )]));
    b.field("c.payload.name", FieldType::String).terminator('\0');
    let spec = Rc::new(b.build().unwrap());

    let mut data = b"utf-16le".to_vec();
    data.extend([b'A', 0, b'B', 0, 0, 0]);
    let reader = reader(spec.clone(), memory(data), ReadDirection::Forward);
    let payload = spec.id("c.payload");
    let ctx = reader.new_context(None);

    let fields = reader
        .read_fields(0, &payload, &BlockRef::new(payload.clone(), 0), Some(14), &ctx)
        .unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].character_encoding(), Some(encoding_rs::UTF_8));
    assert_eq!(fields[1].character_encoding(), Some(encoding_rs::UTF_16LE));
    assert_eq!(fields[1].size(), Some(6));
    assert_eq!(
        fields[1].interpreted_value().unwrap(),
        Interpreted::String("AB".into())
    );
}

#[test]
fn summed_size_leaves_the_rest_to_the_last_field() {
    let mut b = SpecificationBuilder::new("u");
    b.container("u");
    b.field_payload("u.payload");
    b.field("u.payload.total", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SummedSizeOf(vec![
            BlockId::new("u", "u.payload.a"),
            BlockId::new("u", "u.payload.b"),
        ]));
    b.field("u.payload.a", FieldType::Binary).fixed(2);
    b.field("u.payload.b", FieldType::Binary);
    let spec = Rc::new(b.build().unwrap());

    let reader = reader(spec.clone(), memory(vec![5, 1, 2, 3, 4, 5, 9]), ReadDirection::Forward);
    let payload = spec.id("u.payload");
    let ctx = reader.new_context(None);

    let fields = reader
        .read_fields(0, &payload, &BlockRef::new(payload.clone(), 0), Some(7), &ctx)
        .unwrap();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[1].binary_value().unwrap(), vec![1, 2]);
    assert_eq!(fields[2].id(), &spec.id("u.payload.b"));
    assert_eq!(fields[2].binary_value().unwrap(), vec![3, 4, 5]);
    assert!(is_unknown_field(&fields[3]));
    assert_eq!(fields[3].binary_value().unwrap(), vec![9]);
}

struct ItemSize(BlockId);

impl SizeProvider for ItemSize {
    fn size_of(&self, id: &BlockId, _: usize, _: &ContainerContext) -> Option<u64> {
        (id == &self.0).then_some(2)
    }
}

struct ItemCount(BlockId);

impl CountProvider for ItemCount {
    fn count_of(&self, id: &BlockId, _: &ContainerContext) -> Option<u64> {
        (id == &self.0).then_some(3)
    }
}

#[test]
fn custom_providers_drive_the_reader() {
    let mut b = SpecificationBuilder::new("v");
    b.container("v");
    b.field_payload("v.payload");
    b.field("v.payload.item", FieldType::Binary).occurrences(0, 10);
    let spec = Rc::new(b.build().unwrap());
    let item = spec.id("v.payload.item");
    let payload = spec.id("v.payload");
    let me = BlockRef::new(payload.clone(), 0);

    let mut reader = DataBlockReader::new(
        spec.clone(),
        memory((0..8).collect()),
        ReadDirection::Forward,
        ReaderConfig::default(),
    );

    // Without providers the item is absent and all bytes are unknown
    let ctx = reader.new_context(None);
    let fields = reader.read_fields(0, &payload, &me, Some(8), &ctx).unwrap();
    assert_eq!(fields.len(), 1);
    assert!(is_unknown_field(&fields[0]));

    reader.set_custom_size_provider(Some(Rc::new(ItemSize(item.clone()))));
    reader.set_custom_count_provider(Some(Rc::new(ItemCount(item.clone()))));

    let ctx = reader.new_context(None);
    let fields = reader.read_fields(0, &payload, &me, Some(8), &ctx).unwrap();
    assert_eq!(fields.len(), 4);
    for (i, field) in fields[..3].iter().enumerate() {
        assert_eq!(field.id(), &item);
        assert_eq!(field.sequence_number(), i);
        assert_eq!(field.size(), Some(2));
    }
    assert!(is_unknown_field(&fields[3]));
    assert_eq!(fields[3].binary_value().unwrap(), vec![6, 7]);

    reader.set_custom_count_provider(None);
    let ctx = reader.new_context(None);
    assert_eq!(ctx.get_occurrences_of(&item).unwrap(), None);
    assert_eq!(ctx.get_size_of(&item, 0).unwrap(), Some(2));
}

#[test]
fn oversized_length_is_end_of_medium() {
    let mut b = SpecificationBuilder::new("x");
    b.default_byte_order(ByteOrder::LittleEndian);
    b.container("x").header_key(MagicKey::new(b"XX", 0));
    b.header("x.header");
    b.field("x.header.magic", FieldType::Binary).fixed(2);
    b.field("x.header.len", FieldType::UnsignedNumeric)
        .fixed(8)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new("x", "x.payload")]));
    b.field_payload("x.payload");
    b.field("x.payload.data", FieldType::Binary);
    let spec = Rc::new(b.build().unwrap());

    let mut data = b"XX".to_vec();
    data.extend((i64::MAX as u64).to_le_bytes());
    data.extend([1, 2, 3]);
    let reader = reader(spec.clone(), memory(data), ReadDirection::Forward);

    let container = reader
        .read_container_with_id(0, &spec.id("x"), None, None, None, 0)
        .unwrap();
    assert_eq!(container.payload().total_size(), i64::MAX as u64);

    let fields = container.payload().fields().unwrap();
    assert!(matches!(
        fields[0].binary_value(),
        Err(BlockError::Medium(MediumError::EndOfMedium { available: 3, .. }))
    ));
}

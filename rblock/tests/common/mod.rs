#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rblock::{DataBlockReader, ReadDirection, ReaderConfig};
use rcore::{
    BlockId, FieldFunction, FieldType, FormatSpecification, MagicKey, MediumStore, MemoryMedium,
    SpecificationBuilder,
};

/// `TT` then chunks of a one byte length, a three byte type and the data.
pub fn chunk_spec() -> Rc<FormatSpecification> {
    let mut b = SpecificationBuilder::new("t");
    b.container("t").header_key(MagicKey::new(b"TT", 0));
    b.header("t.header");
    b.field("t.header.magic", FieldType::Binary).fixed(2);
    b.container_payload("t.payload");
    b.container("t.payload.chunk").generic();
    b.header("t.payload.chunk.header");
    b.field("t.payload.chunk.header.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new(
            "t",
            "t.payload.chunk.payload",
        )]));
    b.field("t.payload.chunk.header.type", FieldType::String)
        .fixed(3)
        .add_function(FieldFunction::IdOf(vec![BlockId::new("t", "t.payload.chunk")]));
    b.field_payload("t.payload.chunk.payload");
    b.field("t.payload.chunk.payload.data", FieldType::Binary);
    b.default_nested_container("t.payload.chunk");
    Rc::new(b.build().unwrap())
}

pub fn chunk_data() -> Vec<u8> {
    let mut data = b"TT".to_vec();
    data.extend([3, b'A', b'B', b'C', 1, 2, 3]);
    data.extend([2, b'X', b'Y', b'Z', 9, 9]);
    data
}

/// Header `HD` and footer `FT`, both carrying the payload length.
pub fn symmetric_spec() -> Rc<FormatSpecification> {
    let payload = || FieldFunction::SizeOf(vec![BlockId::new("s", "s.payload")]);

    let mut b = SpecificationBuilder::new("s");
    b.container("s")
        .header_key(MagicKey::new(b"HD", 0))
        .footer_key(MagicKey::new(b"FT", -2));
    b.header("s.header");
    b.field("s.header.magic", FieldType::Binary).fixed(2);
    b.field("s.header.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(payload());
    b.field_payload("s.payload");
    b.field("s.payload.value", FieldType::UnsignedNumeric);
    b.footer("s.footer");
    b.field("s.footer.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(payload());
    b.field("s.footer.magic", FieldType::Binary).fixed(2);
    Rc::new(b.build().unwrap())
}

pub fn symmetric_data(value: &[u8]) -> Vec<u8> {
    let mut data = b"HD".to_vec();
    data.push(value.len() as u8);
    data.extend_from_slice(value);
    data.push(value.len() as u8);
    data.extend_from_slice(b"FT");
    data
}

pub fn memory(data: Vec<u8>) -> Rc<RefCell<dyn MediumStore>> {
    Rc::new(RefCell::new(MemoryMedium::new(data)))
}

pub fn reader(
    spec: Rc<FormatSpecification>,
    medium: Rc<RefCell<dyn MediumStore>>,
    direction: ReadDirection,
) -> Rc<DataBlockReader> {
    Rc::new(DataBlockReader::new(
        spec,
        medium,
        direction,
        ReaderConfig::default(),
    ))
}

/// Chunks as in `chunk_spec`, framed by `BB` and a footer holding the
/// payload length followed by `BE`.
pub fn framed_chunk_spec() -> Rc<FormatSpecification> {
    let mut b = SpecificationBuilder::new("b");
    b.container("b").footer_key(MagicKey::new(b"BE", -2));
    b.header("b.header");
    b.field("b.header.magic", FieldType::Binary).fixed(2);
    b.container_payload("b.payload");
    b.container("b.payload.chunk").generic();
    b.header("b.payload.chunk.header");
    b.field("b.payload.chunk.header.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new(
            "b",
            "b.payload.chunk.payload",
        )]));
    b.field("b.payload.chunk.header.type", FieldType::String)
        .fixed(3)
        .add_function(FieldFunction::IdOf(vec![BlockId::new("b", "b.payload.chunk")]));
    b.field_payload("b.payload.chunk.payload");
    b.field("b.payload.chunk.payload.data", FieldType::Binary);
    b.footer("b.footer");
    b.field("b.footer.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new("b", "b.payload")]));
    b.field("b.footer.magic", FieldType::Binary).fixed(2);
    b.default_nested_container("b.payload.chunk");
    Rc::new(b.build().unwrap())
}

pub fn framed_chunk_data() -> Vec<u8> {
    let mut data = b"BB".to_vec();
    data.extend([3, b'A', b'B', b'C', 1, 2, 3]);
    data.extend([2, b'X', b'Y', b'Z', 9, 9]);
    data.extend([13, b'B', b'E']);
    data
}

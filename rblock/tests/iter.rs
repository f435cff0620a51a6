mod common;

use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

use rblock::{BlockError, BlockRef, MediumContainerIterator, PayloadContainerIterator, ReadDirection};
use rcore::{
    BlockId, FieldFunction, FieldType, MagicKey, MediumError, MediumStore, SpecificationBuilder,
    StreamMedium,
};

use common::*;

fn two_containers() -> Vec<u8> {
    let mut data = symmetric_data(&[1]);
    data.extend(symmetric_data(&[0, 2]));
    data
}

#[test]
fn forward_over_medium() {
    let spec = symmetric_spec();
    let reader = reader(spec.clone(), memory(two_containers()), ReadDirection::Forward);

    let containers: Vec<_> = MediumContainerIterator::new(vec![reader], ReadDirection::Forward)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].offset(), 0);
    assert_eq!(containers[0].sequence_number(), 0);
    assert_eq!(containers[1].offset(), 7);
    assert_eq!(containers[1].sequence_number(), 1);
    assert_eq!(containers[1].total_size(), Some(8));
}

#[test]
fn backward_over_medium() {
    let spec = symmetric_spec();
    let reader = reader(spec.clone(), memory(two_containers()), ReadDirection::Backward);

    let mut iter = MediumContainerIterator::new(vec![reader], ReadDirection::Backward).unwrap();
    assert_eq!(iter.offset(), 15);

    let last = iter.next().unwrap().unwrap();
    assert_eq!(last.offset(), 7);
    assert_eq!(last.payload().total_size(), 2);
    assert_eq!(iter.offset(), 7);

    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.offset(), 0);
    assert_eq!(first.payload().total_size(), 1);

    assert!(iter.next().is_none());
}

#[test]
fn first_matching_format_wins() {
    let chunks = reader(chunk_spec(), memory(chunk_data()), ReadDirection::Forward);
    let medium = chunks.provider().medium().clone();
    let symmetric = reader(symmetric_spec(), medium, ReadDirection::Forward);

    let containers: Vec<_> =
        MediumContainerIterator::new(vec![symmetric, chunks], ReadDirection::Forward)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].id().global_id(), "t");
}

#[test]
fn unknown_data_stops_iteration() {
    let mut data = symmetric_data(&[1]);
    data.extend(b"garbage");
    let reader = reader(symmetric_spec(), memory(data), ReadDirection::Forward);

    let mut iter = MediumContainerIterator::new(vec![reader], ReadDirection::Forward).unwrap();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(
        iter.next(),
        Some(Err(BlockError::UnknownDataFormat { offset: 7 }))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn stream_medium() {
    let medium: Rc<RefCell<dyn MediumStore>> =
        Rc::new(RefCell::new(StreamMedium::new(Cursor::new(chunk_data()))));
    let reader = reader(chunk_spec(), medium.clone(), ReadDirection::Forward);

    let containers: Vec<_> = MediumContainerIterator::new(vec![reader], ReadDirection::Forward)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(containers.len(), 1);
    let chunks = containers[0].payload().containers().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].payload().fields().unwrap()[0].binary_value().unwrap(), vec![1, 2, 3]);
}

#[test]
fn stream_cannot_be_read_backward() {
    let medium: Rc<RefCell<dyn MediumStore>> =
        Rc::new(RefCell::new(StreamMedium::new(Cursor::new(chunk_data()))));
    let reader = reader(chunk_spec(), medium, ReadDirection::Backward);

    assert!(matches!(
        MediumContainerIterator::new(vec![reader], ReadDirection::Backward),
        Err(BlockError::Medium(MediumError::NotRandomAccess))
    ));
}

#[test]
fn payload_iteration() {
    let spec = chunk_spec();
    let reader = reader(spec.clone(), memory(chunk_data()), ReadDirection::Forward);
    let payload = BlockRef::new(spec.id("t.payload"), 0);

    let iter = PayloadContainerIterator::new(
        reader.clone(),
        payload,
        2,
        Some(13),
        reader.new_context(None),
    );
    let ids: Vec<_> = iter
        .map(|c| c.map(|c| c.id().local_id().to_string()))
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(ids, vec!["ABC", "XYZ"]);
}

#[test]
fn payload_without_known_children() {
    // No default nested container to fall back on
    let mut b = SpecificationBuilder::new("p");
    b.container("p");
    b.container_payload("p.payload");
    b.container("p.payload.box").header_key(MagicKey::new(b"BX", 0));
    b.header("p.payload.box.header");
    b.field("p.payload.box.header.magic", FieldType::Binary).fixed(2);
    b.field_payload("p.payload.box.payload").fixed(0);
    let spec = Rc::new(b.build().unwrap());

    let reader = reader(spec.clone(), memory(b"BXZZ".to_vec()), ReadDirection::Forward);
    let mut iter = PayloadContainerIterator::new(
        reader.clone(),
        BlockRef::new(spec.id("p.payload"), 0),
        0,
        Some(4),
        reader.new_context(None),
    );

    assert_eq!(iter.next().unwrap().unwrap().id(), &spec.id("p.payload.box"));
    assert!(matches!(iter.next(), Some(Err(BlockError::NoChildContainer(_)))));
    assert!(iter.next().is_none());
}

#[test]
fn empty_top_level_container_stops_iteration() {
    let mut b = SpecificationBuilder::new("e");
    b.container("e").header_key(MagicKey::new(b"E", 0));
    b.field_payload("e.payload").fixed(0);
    let spec = Rc::new(b.build().unwrap());

    let reader = reader(spec, memory(b"E".to_vec()), ReadDirection::Forward);
    let mut iter = MediumContainerIterator::new(vec![reader], ReadDirection::Forward).unwrap();

    assert!(matches!(
        iter.next(),
        Some(Err(BlockError::EmptyContainer { offset: 0, .. }))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn empty_nested_container_is_an_error() {
    // The default nested box always matches, its payload size of 0 comes
    // from the parent header
    let mut b = SpecificationBuilder::new("p");
    b.container("p").header_key(MagicKey::new(b"PP", 0));
    b.header("p.header");
    b.field("p.header.magic", FieldType::Binary).fixed(2);
    b.field("p.header.len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new("p", "p.payload")]));
    b.field("p.header.box_len", FieldType::UnsignedNumeric)
        .fixed(1)
        .add_function(FieldFunction::SizeOf(vec![BlockId::new(
            "p",
            "p.payload.box.payload",
        )]));
    b.container_payload("p.payload");
    b.container("p.payload.box");
    b.field_payload("p.payload.box.payload");
    b.field("p.payload.box.payload.data", FieldType::Binary);
    b.default_nested_container("p.payload.box");
    let spec = Rc::new(b.build().unwrap());

    let mut data = b"PP".to_vec();
    data.extend([3, 0, 1, 2, 3]);
    let reader = reader(spec.clone(), memory(data), ReadDirection::Forward);

    let container = reader
        .read_container_with_id(0, &spec.id("p"), None, None, None, 0)
        .unwrap();
    assert_eq!(container.payload().total_size(), 3);
    assert!(matches!(
        container.payload().containers(),
        Err(BlockError::EmptyContainer { offset: 4, .. })
    ));
}

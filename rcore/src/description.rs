use std::rc::Rc;

use encoding_rs::Encoding;

use crate::flags::FlagSpecification;
use crate::id::BlockId;
use crate::value::{ByteOrder, Interpreted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Container,
    Header,
    Footer,
    Field,
    FieldBasedPayload,
    ContainerBasedPayload,
}

impl PhysicalType {
    pub fn is_payload(&self) -> bool {
        matches!(
            self,
            PhysicalType::FieldBasedPayload | PhysicalType::ContainerBasedPayload
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    #[default]
    Binary,
    UnsignedNumeric,
    SignedNumeric,
    String,
    Enumerated,
    Flags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldFunctionKind {
    SizeOf,
    SummedSizeOf,
    CountOf,
    PresenceOf,
    ByteOrderOf,
    CharacterEncodingOf,
    IdOf,
}

/// A relationship where the interpreted value of one field determines a
/// property of the target blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFunction {
    SizeOf(Vec<BlockId>),
    /// The value is the size of all targets together.
    SummedSizeOf(Vec<BlockId>),
    CountOf(Vec<BlockId>),
    /// The target is present iff the named flag of this field has the value.
    PresenceOf {
        targets: Vec<BlockId>,
        flag_name: String,
        flag_value: u64,
    },
    ByteOrderOf(Vec<BlockId>),
    CharacterEncodingOf(Vec<BlockId>),
    IdOf(Vec<BlockId>),
}

impl FieldFunction {
    pub fn kind(&self) -> FieldFunctionKind {
        match self {
            FieldFunction::SizeOf(_) => FieldFunctionKind::SizeOf,
            FieldFunction::SummedSizeOf(_) => FieldFunctionKind::SummedSizeOf,
            FieldFunction::CountOf(_) => FieldFunctionKind::CountOf,
            FieldFunction::PresenceOf { .. } => FieldFunctionKind::PresenceOf,
            FieldFunction::ByteOrderOf(_) => FieldFunctionKind::ByteOrderOf,
            FieldFunction::CharacterEncodingOf(_) => FieldFunctionKind::CharacterEncodingOf,
            FieldFunction::IdOf(_) => FieldFunctionKind::IdOf,
        }
    }

    pub fn targets(&self) -> &[BlockId] {
        match self {
            FieldFunction::SizeOf(t)
            | FieldFunction::SummedSizeOf(t)
            | FieldFunction::CountOf(t)
            | FieldFunction::ByteOrderOf(t)
            | FieldFunction::CharacterEncodingOf(t)
            | FieldFunction::IdOf(t) => t,
            FieldFunction::PresenceOf { targets, .. } => targets,
        }
    }
}

/// Fixed byte pattern at a position relative to the container start, or
/// relative to the container end for footer keys (negative delta).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicKey {
    pub bytes: Vec<u8>,
    pub bit_length: u64,
    pub delta_offset: i64,
}

impl MagicKey {
    pub fn new(bytes: &[u8], delta_offset: i64) -> Self {
        MagicKey {
            bytes: bytes.to_vec(),
            bit_length: bytes.len() as u64 * 8,
            delta_offset,
        }
    }

    pub fn with_bit_length(bytes: &[u8], bit_length: u64, delta_offset: i64) -> Self {
        MagicKey {
            bytes: bytes.to_vec(),
            bit_length,
            delta_offset,
        }
    }

    pub fn byte_length(&self) -> u64 {
        self.bit_length.div_ceil(8)
    }

    /// Compares the leading `bit_length` bits, a trailing partial byte is
    /// compared on its most significant bits only.
    pub fn matches(&self, data: &[u8]) -> bool {
        let len = self.byte_length() as usize;
        if data.len() < len || self.bytes.len() < len {
            return false;
        }

        let full = (self.bit_length / 8) as usize;
        if data[..full] != self.bytes[..full] {
            return false;
        }

        let rest = (self.bit_length % 8) as u32;
        if rest == 0 {
            return true;
        }

        let mask = 0xffu8 << (8 - rest);
        (data[full] & mask) == (self.bytes[full] & mask)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldProperties {
    pub field_type: FieldType,
    pub default_value: Option<Interpreted>,
    /// Interpreted name to its binary encoding, in declaration order.
    pub enumerated: Vec<(String, Vec<u8>)>,
    pub byte_order: Option<ByteOrder>,
    pub character_encoding: Option<&'static Encoding>,
    pub flag_specification: Option<Rc<FlagSpecification>>,
    pub termination_character: Option<char>,
    pub functions: Vec<FieldFunction>,
}

impl FieldProperties {
    pub fn new(field_type: FieldType) -> Self {
        FieldProperties {
            field_type,
            ..Default::default()
        }
    }

    pub fn function(&self, kind: FieldFunctionKind) -> Option<&FieldFunction> {
        self.functions.iter().find(|f| f.kind() == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDescription {
    pub id: BlockId,
    pub name: String,
    pub physical_type: PhysicalType,
    pub children: Vec<BlockId>,
    pub field: Option<FieldProperties>,
    pub min_occurrences: u64,
    pub max_occurrences: u64,
    pub min_size: u64,
    pub max_size: Option<u64>,
    /// Offset from the container start, only set when it is the same for
    /// every instance.
    pub byte_offset: Option<u64>,
    pub header_magic_keys: Vec<MagicKey>,
    pub footer_magic_keys: Vec<MagicKey>,
    pub generic: bool,
    pub id_field: Option<BlockId>,
}

impl BlockDescription {
    pub fn new(id: BlockId, physical_type: PhysicalType) -> Self {
        let field = match physical_type {
            PhysicalType::Field => Some(FieldProperties::default()),
            _ => None,
        };

        BlockDescription {
            name: id.local_id().to_string(),
            id,
            physical_type,
            children: Vec::new(),
            field,
            min_occurrences: 1,
            max_occurrences: 1,
            min_size: 0,
            max_size: None,
            byte_offset: None,
            header_magic_keys: Vec::new(),
            footer_magic_keys: Vec::new(),
            generic: false,
            id_field: None,
        }
    }

    pub fn fixed_size(&self) -> Option<u64> {
        match self.max_size {
            Some(max) if max == self.min_size => Some(max),
            _ => None,
        }
    }

    pub fn has_fixed_occurrences(&self) -> bool {
        self.min_occurrences == self.max_occurrences
    }

    pub fn is_optional(&self) -> bool {
        self.min_occurrences == 0 && self.max_occurrences == 1
    }

    pub fn field_type(&self) -> Option<FieldType> {
        self.field.as_ref().map(|f| f.field_type)
    }

    pub fn function(&self, kind: FieldFunctionKind) -> Option<&FieldFunction> {
        self.field.as_ref().and_then(|f| f.function(kind))
    }

    fn props(&mut self) -> &mut FieldProperties {
        self.field.get_or_insert_with(FieldProperties::default)
    }

    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    pub fn occurrences(&mut self, min: u64, max: u64) -> &mut Self {
        self.min_occurrences = min;
        self.max_occurrences = max;
        self
    }

    pub fn fixed(&mut self, size: u64) -> &mut Self {
        self.min_size = size;
        self.max_size = Some(size);
        self
    }

    pub fn size_range(&mut self, min: u64, max: Option<u64>) -> &mut Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn header_key(&mut self, key: MagicKey) -> &mut Self {
        self.header_magic_keys.push(key);
        self
    }

    pub fn footer_key(&mut self, key: MagicKey) -> &mut Self {
        self.footer_magic_keys.push(key);
        self
    }

    pub fn generic(&mut self) -> &mut Self {
        self.generic = true;
        self
    }

    pub fn byte_order(&mut self, order: ByteOrder) -> &mut Self {
        self.props().byte_order = Some(order);
        self
    }

    pub fn encoding(&mut self, encoding: &'static Encoding) -> &mut Self {
        self.props().character_encoding = Some(encoding);
        self
    }

    pub fn terminator(&mut self, c: char) -> &mut Self {
        self.props().termination_character = Some(c);
        self
    }

    pub fn enumerated(&mut self, name: &str, bytes: &[u8]) -> &mut Self {
        self.props().enumerated.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn default_value(&mut self, value: Interpreted) -> &mut Self {
        self.props().default_value = Some(value);
        self
    }

    pub fn flags(&mut self, spec: FlagSpecification) -> &mut Self {
        self.props().flag_specification = Some(Rc::new(spec));
        self
    }

    pub fn add_function(&mut self, function: FieldFunction) -> &mut Self {
        self.props().functions.push(function);
        self
    }
}

#[cfg(test)]
mod test_magic_key {
    use super::*;

    #[test]
    fn whole_bytes() {
        let key = MagicKey::new(b"TAG", 0);

        assert_eq!(key.byte_length(), 3);
        assert!(key.matches(b"TAGxyz"));
        assert!(!key.matches(b"TAX"));
        assert!(!key.matches(b"TA"));
    }

    #[test]
    fn partial_byte() {
        // 11 bits: 0xFF then the top 3 bits of 0xE0, the MPEG frame sync
        let key = MagicKey::with_bit_length(&[0xff, 0xe0], 11, 0);

        assert_eq!(key.byte_length(), 2);
        assert!(key.matches(&[0xff, 0xfb]));
        assert!(key.matches(&[0xff, 0xe0]));
        assert!(!key.matches(&[0xff, 0xc0]));
    }
}

#[cfg(test)]
mod test_block_description {
    use super::*;

    #[test]
    fn fixed_and_variable_size() {
        let mut desc = BlockDescription::new(BlockId::new("t", "t.h.f"), PhysicalType::Field);

        assert_eq!(desc.fixed_size(), None);
        desc.fixed(4);
        assert_eq!(desc.fixed_size(), Some(4));
        desc.size_range(1, Some(4));
        assert_eq!(desc.fixed_size(), None);
    }

    #[test]
    fn function_lookup() {
        let target = BlockId::new("t", "t.payload");
        let mut desc = BlockDescription::new(BlockId::new("t", "t.h.len"), PhysicalType::Field);
        desc.add_function(FieldFunction::SizeOf(vec![target.clone()]));

        let f = desc.function(FieldFunctionKind::SizeOf).unwrap();
        assert_eq!(f.targets(), &[target]);
        assert!(desc.function(FieldFunctionKind::CountOf).is_none());
    }
}

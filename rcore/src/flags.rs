use std::fmt;
use std::rc::Rc;

pub const BITS_PER_BYTE: usize = 8;

/// Bit position within a flag byte array, bit 0 is the least significant bit
/// of the addressed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAddress {
    pub byte: usize,
    pub bit: u8,
}

impl BitAddress {
    pub fn new(byte: usize, bit: u8) -> Self {
        debug_assert!((bit as usize) < BITS_PER_BYTE);
        BitAddress { byte, bit }
    }

    fn absolute(&self) -> usize {
        self.byte * BITS_PER_BYTE + self.bit as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagDescription {
    pub name: String,
    pub start: BitAddress,
    pub bit_size: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpecification {
    flags: Vec<FlagDescription>,
    byte_length: usize,
    default_bytes: Vec<u8>,
}

impl FlagSpecification {
    pub fn new(flags: Vec<FlagDescription>, byte_length: usize, default_bytes: Vec<u8>) -> Self {
        let mut default_bytes = default_bytes;
        default_bytes.resize(byte_length, 0);

        FlagSpecification {
            flags,
            byte_length,
            default_bytes,
        }
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn default_bytes(&self) -> &[u8] {
        &self.default_bytes
    }

    pub fn flag(&self, name: &str) -> Option<&FlagDescription> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn flags(&self) -> &[FlagDescription] {
        &self.flags
    }
}

/// A fixed size bit array interpreted through a [`FlagSpecification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    spec: Rc<FlagSpecification>,
    bytes: Vec<u8>,
}

impl Flags {
    pub fn new(spec: Rc<FlagSpecification>) -> Self {
        let bytes = spec.default_bytes().to_vec();
        Flags { spec, bytes }
    }

    /// Takes over the raw bytes as they are, shorter input is padded with zeros.
    pub fn from_bytes(spec: Rc<FlagSpecification>, bytes: &[u8]) -> Option<Self> {
        if bytes.len() > spec.byte_length() {
            return None;
        }

        let mut flags = Flags::new(spec);
        flags.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(flags)
    }

    pub fn specification(&self) -> &FlagSpecification {
        &self.spec
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bit(&self, abs: usize) -> Option<bool> {
        self.bytes
            .get(abs / BITS_PER_BYTE)
            .map(|b| (b >> (abs % BITS_PER_BYTE)) & 1 == 1)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        let desc = self.spec.flag(name)?;
        self.bit(desc.start.absolute())
    }

    /// Integer value of a possibly multi-bit flag, bits can span byte boundaries.
    pub fn flag_value(&self, name: &str) -> Option<u64> {
        let desc = self.spec.flag(name)?;
        let start = desc.start.absolute();

        let mut value = 0u64;
        for i in 0..desc.bit_size as usize {
            if self.bit(start + i)? {
                value |= 1 << i;
            }
        }
        Some(value)
    }

    pub fn set_flag(&mut self, name: &str, set: bool) -> bool {
        let abs = match self.spec.flag(name) {
            Some(desc) => desc.start.absolute(),
            None => return false,
        };

        match self.bytes.get_mut(abs / BITS_PER_BYTE) {
            Some(byte) => {
                let mask = 1u8 << (abs % BITS_PER_BYTE);
                if set {
                    *byte |= mask;
                } else {
                    *byte &= !mask;
                }
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for desc in self.spec.flags() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}={}", desc.name, self.flag_value(&desc.name).unwrap_or(0))?;
        }
        Ok(())
    }
}

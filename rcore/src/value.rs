use std::fmt;
use std::str::FromStr;

use crate::flags::Flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

impl FromStr for ByteOrder {
    type Err = String;

    // Labels are taken from field values, so be lenient about the spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "big_endian" | "bigendian" | "big-endian" | "big" | "be" => Ok(ByteOrder::BigEndian),
            "little_endian" | "littleendian" | "little-endian" | "little" | "le" => {
                Ok(ByteOrder::LittleEndian)
            }
            x => Err(format!("unknown byte order: {:?}", x)),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::BigEndian => write!(f, "BIG_ENDIAN"),
            ByteOrder::LittleEndian => write!(f, "LITTLE_ENDIAN"),
        }
    }
}

/// The interpreted value of a field, one variant per field type.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpreted {
    Binary(Vec<u8>),
    Unsigned(u64),
    Signed(i64),
    String(String),
    Enumerated(String),
    Flags(Flags),
}

impl Interpreted {
    /// Numeric view used when a field value drives a size or a count.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Interpreted::Unsigned(x) => Some(*x),
            Interpreted::Signed(x) if *x >= 0 => Some(*x as u64),
            Interpreted::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_flags(&self) -> Option<&Flags> {
        match self {
            Interpreted::Flags(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for Interpreted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpreted::Binary(x) => {
                for b in x {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Interpreted::Unsigned(x) => write!(f, "{}", x),
            Interpreted::Signed(x) => write!(f, "{}", x),
            Interpreted::String(x) => write!(f, "{}", x),
            Interpreted::Enumerated(x) => write!(f, "{}", x),
            Interpreted::Flags(x) => write!(f, "{}", x),
        }
    }
}

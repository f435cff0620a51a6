//! Codecs between the raw bytes of a field and its interpreted value.
//!
//! Every converter needs a resolved byte order and character encoding, even
//! when its field type ignores one of them. A missing one means the context
//! could not resolve it, which is reported as a conversion failure.
use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use rcore::{BlockDescription, ByteOrder, FieldType, Flags, Interpreted};

use crate::error::{BlockError, Result};

pub const MAX_NUMERIC_BYTES: usize = 8;

pub trait FieldConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted>;

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>>;
}

pub struct BinaryConverter;
pub struct UnsignedConverter;
pub struct SignedConverter;
pub struct StringConverter;
pub struct EnumeratedConverter;
pub struct FlagsConverter;

static BINARY: BinaryConverter = BinaryConverter;
static UNSIGNED: UnsignedConverter = UnsignedConverter;
static SIGNED: SignedConverter = SignedConverter;
static STRING: StringConverter = StringConverter;
static ENUMERATED: EnumeratedConverter = EnumeratedConverter;
static FLAGS: FlagsConverter = FlagsConverter;

pub fn converter_for(field_type: FieldType) -> &'static dyn FieldConverter {
    match field_type {
        FieldType::Binary => &BINARY,
        FieldType::UnsignedNumeric => &UNSIGNED,
        FieldType::SignedNumeric => &SIGNED,
        FieldType::String => &STRING,
        FieldType::Enumerated => &ENUMERATED,
        FieldType::Flags => &FLAGS,
    }
}

fn binary_error(desc: &BlockDescription, reason: impl Into<String>) -> BlockError {
    BlockError::BinaryConversion {
        id: desc.id.clone(),
        reason: reason.into(),
    }
}

fn interpreted_error(desc: &BlockDescription, reason: impl Into<String>) -> BlockError {
    BlockError::InterpretedConversion {
        id: desc.id.clone(),
        reason: reason.into(),
    }
}

fn resolved(
    byte_order: Option<ByteOrder>,
    encoding: Option<&'static Encoding>,
) -> std::result::Result<(ByteOrder, &'static Encoding), &'static str> {
    match (byte_order, encoding) {
        (Some(b), Some(e)) => Ok((b, e)),
        (None, _) => Err("byte order is not resolved"),
        (_, None) => Err("character encoding is not resolved"),
    }
}

fn numeric_width(desc: &BlockDescription) -> Result<usize> {
    match desc.max_size {
        Some(w) if w >= 1 && w as usize <= MAX_NUMERIC_BYTES => Ok(w as usize),
        Some(w) => Err(interpreted_error(
            desc,
            format!("numeric fields hold 1 to {} bytes, not {}", MAX_NUMERIC_BYTES, w),
        )),
        None => Err(interpreted_error(desc, "numeric field has no maximum size")),
    }
}

fn check_numeric_length(desc: &BlockDescription, len: usize) -> Result<()> {
    if len == 0 || len > MAX_NUMERIC_BYTES {
        return Err(binary_error(
            desc,
            format!("numeric fields hold 1 to {} bytes, not {}", MAX_NUMERIC_BYTES, len),
        ));
    }
    Ok(())
}

impl FieldConverter for BinaryConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;
        Ok(Interpreted::Binary(binary.to_vec()))
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;
        match value {
            Interpreted::Binary(x) => Ok(x.clone()),
            x => Err(interpreted_error(desc, format!("not a binary value: {:?}", x))),
        }
    }
}

impl FieldConverter for UnsignedConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        let (order, _) = resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;
        check_numeric_length(desc, binary.len())?;

        let mut rdr = Cursor::new(binary);
        let value = match order {
            ByteOrder::BigEndian => rdr.read_uint::<BigEndian>(binary.len()),
            ByteOrder::LittleEndian => rdr.read_uint::<LittleEndian>(binary.len()),
        }
        .map_err(|e| binary_error(desc, e.to_string()))?;

        if value > i64::MAX as u64 {
            return Err(binary_error(
                desc,
                format!("{} is negative as a signed 64 bit value", value as i64),
            ));
        }
        Ok(Interpreted::Unsigned(value))
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        let (order, _) = resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;
        let width = numeric_width(desc)?;

        let value = match value {
            Interpreted::Unsigned(x) => *x,
            Interpreted::Signed(x) if *x >= 0 => *x as u64,
            x => return Err(interpreted_error(desc, format!("not an unsigned value: {:?}", x))),
        };

        let fits = if width == MAX_NUMERIC_BYTES {
            value <= i64::MAX as u64
        } else {
            value >> (width * 8) == 0
        };
        if !fits {
            return Err(interpreted_error(
                desc,
                format!("{} does not fit into {} bytes", value, width),
            ));
        }

        let mut wtr = Vec::with_capacity(width);
        match order {
            ByteOrder::BigEndian => wtr.write_uint::<BigEndian>(value, width),
            ByteOrder::LittleEndian => wtr.write_uint::<LittleEndian>(value, width),
        }
        .map_err(|e| interpreted_error(desc, e.to_string()))?;
        Ok(wtr)
    }
}

impl FieldConverter for SignedConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        let (order, _) = resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;
        check_numeric_length(desc, binary.len())?;

        let mut rdr = Cursor::new(binary);
        let value = match order {
            ByteOrder::BigEndian => rdr.read_int::<BigEndian>(binary.len()),
            ByteOrder::LittleEndian => rdr.read_int::<LittleEndian>(binary.len()),
        }
        .map_err(|e| binary_error(desc, e.to_string()))?;

        Ok(Interpreted::Signed(value))
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        let (order, _) = resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;
        let width = numeric_width(desc)?;

        let value = match value {
            Interpreted::Signed(x) => *x,
            Interpreted::Unsigned(x) if *x <= i64::MAX as u64 => *x as i64,
            x => return Err(interpreted_error(desc, format!("not a signed value: {:?}", x))),
        };

        if width < MAX_NUMERIC_BYTES {
            let bound = 1i64 << (width * 8 - 1);
            if value < -bound || value >= bound {
                return Err(interpreted_error(
                    desc,
                    format!("{} does not fit into {} bytes", value, width),
                ));
            }
        }

        let mut wtr = Vec::with_capacity(width);
        match order {
            ByteOrder::BigEndian => wtr.write_int::<BigEndian>(value, width),
            ByteOrder::LittleEndian => wtr.write_int::<LittleEndian>(value, width),
        }
        .map_err(|e| interpreted_error(desc, e.to_string()))?;
        Ok(wtr)
    }
}

impl FieldConverter for StringConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        let (_, encoding) = resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;

        // Malformed sequences come out as replacement characters
        let (text, _, _) = encoding.decode(binary);
        let mut text = text.into_owned();

        let terminator = desc
            .field
            .as_ref()
            .and_then(|f| f.termination_character);
        if let Some(idx) = terminator.and_then(|t| text.find(t)) {
            text.truncate(idx);
        }

        Ok(Interpreted::String(text))
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        let (_, encoding) = resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;

        let text = match value {
            Interpreted::String(x) | Interpreted::Enumerated(x) => x,
            x => return Err(interpreted_error(desc, format!("not a string value: {:?}", x))),
        };

        // encoding_rs only encodes into UTF-8 for the UTF-16 family
        if encoding == UTF_16LE {
            return Ok(text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect());
        }
        if encoding == UTF_16BE {
            return Ok(text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect());
        }

        let (bytes, _, unmappable) = encoding.encode(text);
        if unmappable {
            return Err(interpreted_error(
                desc,
                format!("{:?} is not representable in {}", text, encoding.name()),
            ));
        }
        Ok(bytes.into_owned())
    }
}

impl FieldConverter for EnumeratedConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;
        let props = desc
            .field
            .as_ref()
            .ok_or_else(|| binary_error(desc, "not a field"))?;

        if let Some((name, _)) = props.enumerated.iter().find(|(_, b)| b[..] == *binary) {
            return Ok(Interpreted::Enumerated(name.clone()));
        }

        // Unknown values are not an error, they read as the default
        Ok(props
            .default_value
            .clone()
            .unwrap_or_else(|| Interpreted::Binary(binary.to_vec())))
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;
        let props = desc
            .field
            .as_ref()
            .ok_or_else(|| interpreted_error(desc, "not a field"))?;

        let name = match value {
            Interpreted::Enumerated(x) | Interpreted::String(x) => x,
            x => return Err(interpreted_error(desc, format!("not an enumerated value: {:?}", x))),
        };

        props
            .enumerated
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| interpreted_error(desc, format!("unknown enumerated value {:?}", name)))
    }
}

impl FieldConverter for FlagsConverter {
    fn to_interpreted(
        &self,
        binary: &[u8],
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Interpreted> {
        resolved(byte_order, encoding).map_err(|e| binary_error(desc, e))?;
        let spec = desc
            .field
            .as_ref()
            .and_then(|f| f.flag_specification.clone())
            .ok_or_else(|| binary_error(desc, "no flag specification"))?;

        let byte_length = spec.byte_length();
        Flags::from_bytes(spec, binary)
            .map(Interpreted::Flags)
            .ok_or_else(|| {
                binary_error(
                    desc,
                    format!("{} bytes exceed the {} flag bytes", binary.len(), byte_length),
                )
            })
    }

    fn to_binary(
        &self,
        value: &Interpreted,
        desc: &BlockDescription,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Result<Vec<u8>> {
        resolved(byte_order, encoding).map_err(|e| interpreted_error(desc, e))?;
        match value {
            Interpreted::Flags(flags) => Ok(flags.as_bytes().to_vec()),
            x => Err(interpreted_error(desc, format!("not a flags value: {:?}", x))),
        }
    }
}

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use encoding_rs::Encoding;
use log::trace;

use rcore::{BlockDescription, BlockId, ByteOrder, FieldType, Interpreted};

use crate::block::BlockRef;
use crate::convert::converter_for;
use crate::deferred::Deferred;
use crate::error::{BlockError, Result};
use crate::medium_data::MediumDataProvider;

pub enum BinarySource {
    Medium {
        provider: MediumDataProvider,
        offset: u64,
        size: u64,
    },
    Interpreted,
}

pub enum InterpretedSource {
    Binary,
}

/// Smallest unit of a container. The binary and the interpreted value are
/// converted from each other on first access and kept.
pub struct Field {
    desc: Rc<BlockDescription>,
    sequence_number: usize,
    offset: Option<u64>,
    parent: Option<BlockRef>,
    byte_order: Option<ByteOrder>,
    encoding: Option<&'static Encoding>,
    size: Cell<Option<u64>>,
    binary: RefCell<Deferred<Vec<u8>, BinarySource>>,
    interpreted: RefCell<Deferred<Interpreted, InterpretedSource>>,
}

impl Field {
    /// Field backed by `size` bytes of the medium, read now unless `size`
    /// is above `lazy_threshold`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_medium(
        desc: Rc<BlockDescription>,
        sequence_number: usize,
        parent: Option<BlockRef>,
        offset: u64,
        size: u64,
        provider: &MediumDataProvider,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
        lazy_threshold: u64,
    ) -> Result<Field> {
        let binary = if size > lazy_threshold {
            trace!("Field {} at {} is read lazily ({} bytes)", desc.id, offset, size);
            Deferred::Unloaded(BinarySource::Medium {
                provider: provider.clone(),
                offset,
                size,
            })
        } else {
            Deferred::Loaded(provider.get_data(offset, size)?)
        };

        Ok(Field {
            desc,
            sequence_number,
            offset: Some(offset),
            parent,
            byte_order,
            encoding,
            size: Cell::new(Some(size)),
            binary: RefCell::new(binary),
            interpreted: RefCell::new(Deferred::Unloaded(InterpretedSource::Binary)),
        })
    }

    /// Field that only exists as a value so far, its size is unknown until
    /// the binary value was produced.
    pub fn from_interpreted(
        desc: Rc<BlockDescription>,
        sequence_number: usize,
        parent: Option<BlockRef>,
        value: Interpreted,
        byte_order: Option<ByteOrder>,
        encoding: Option<&'static Encoding>,
    ) -> Field {
        Field {
            desc,
            sequence_number,
            offset: None,
            parent,
            byte_order,
            encoding,
            size: Cell::new(None),
            binary: RefCell::new(Deferred::Unloaded(BinarySource::Interpreted)),
            interpreted: RefCell::new(Deferred::Loaded(value)),
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.desc.id
    }

    pub fn description(&self) -> &BlockDescription {
        &self.desc
    }

    pub fn field_type(&self) -> FieldType {
        self.desc.field_type().unwrap_or_default()
    }

    pub fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn parent(&self) -> Option<&BlockRef> {
        self.parent.as_ref()
    }

    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.byte_order
    }

    pub fn character_encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    pub fn size(&self) -> Option<u64> {
        self.size.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.binary.borrow().is_loaded()
    }

    pub fn binary_value(&self) -> Result<Vec<u8>> {
        let mut binary = self.binary.borrow_mut();
        let value = binary.force(|source| match source {
            BinarySource::Medium {
                provider,
                offset,
                size,
            } => {
                trace!("Loading lazy field {} at {}", self.desc.id, offset);
                provider.get_data(*offset, *size)
            }
            BinarySource::Interpreted => {
                let interpreted = self.interpreted.borrow();
                match interpreted.get() {
                    Some(value) => converter_for(self.field_type()).to_binary(
                        value,
                        &self.desc,
                        self.byte_order,
                        self.encoding,
                    ),
                    None => Err(BlockError::InterpretedConversion {
                        id: self.desc.id.clone(),
                        reason: "field has neither a binary nor an interpreted value".into(),
                    }),
                }
            }
        })?;

        // Size is fixed by the first binary value
        if self.size.get().is_none() {
            self.size.set(Some(value.len() as u64));
        }
        Ok(value.clone())
    }

    pub fn interpreted_value(&self) -> Result<Interpreted> {
        if let Some(value) = self.interpreted.borrow().get() {
            return Ok(value.clone());
        }

        let binary = self.binary_value()?;
        let mut interpreted = self.interpreted.borrow_mut();
        let value = interpreted.force(|_| {
            converter_for(self.field_type()).to_interpreted(
                &binary,
                &self.desc,
                self.byte_order,
                self.encoding,
            )
        })?;
        Ok(value.clone())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.desc.id)
            .field("sequence_number", &self.sequence_number)
            .field("offset", &self.offset)
            .field("size", &self.size.get())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

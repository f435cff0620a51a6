//! Iteration over the containers of a medium and of a container payload.
use std::collections::HashMap;
use std::rc::Rc;

use log::{info, warn};

use rcore::{BlockId, MediumError, PhysicalType};

use crate::block::{BlockRef, Container};
use crate::context::ContainerContext;
use crate::error::{BlockError, Result};
use crate::reader::{DataBlockReader, ReadDirection};

/// Top level containers of one medium, in medium order for forward readers
/// and from the end towards the start for backward readers.
///
/// Every step probes the readers in the order they were given and reads the
/// first container whose magic keys match. The iterator ends after the
/// first error.
pub struct MediumContainerIterator {
    readers: Vec<Rc<DataBlockReader>>,
    direction: ReadDirection,
    offset: u64,
    sequence: HashMap<BlockId, usize>,
    done: bool,
}

impl MediumContainerIterator {
    /// Starts at the beginning of the medium, or at its end when reading
    /// backward. All readers have to share `direction`.
    pub fn new(readers: Vec<Rc<DataBlockReader>>, direction: ReadDirection) -> Result<Self> {
        let offset = match direction {
            ReadDirection::Forward => 0,
            ReadDirection::Backward => readers
                .first()
                .and_then(|r| r.provider().length())
                .ok_or(BlockError::Medium(MediumError::NotRandomAccess))?,
        };

        Ok(Self::starting_at(readers, direction, offset))
    }

    pub fn starting_at(readers: Vec<Rc<DataBlockReader>>, direction: ReadDirection, offset: u64) -> Self {
        MediumContainerIterator {
            readers,
            direction,
            offset,
            sequence: HashMap::new(),
            done: false,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn has_next(&self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }

        let provider = match self.readers.first() {
            Some(reader) => reader.provider(),
            None => return Ok(false),
        };

        match self.direction {
            ReadDirection::Forward => Ok(provider.cached_byte_count_at(self.offset) > 0
                || !provider.is_at_end_of_medium(self.offset)?),
            ReadDirection::Backward => Ok(self.offset > 0),
        }
    }

    pub fn read_next(&mut self) -> Result<Container> {
        for reader in &self.readers {
            let remaining = reader.top_level_remaining(self.offset);

            for id in reader.specification().top_level_ids() {
                if !reader.has_container_with_id(self.offset, id, None, remaining)? {
                    continue;
                }

                let seq = self.sequence.entry(id.clone()).or_insert(0);
                let container =
                    reader.read_container_with_id(self.offset, id, None, remaining, None, *seq)?;
                *seq += 1;

                let next = match self.direction {
                    ReadDirection::Forward => {
                        let size = container
                            .total_size()
                            .ok_or_else(|| BlockError::UndeterminedSize(container.id().clone()))?;
                        self.offset + size
                    }
                    ReadDirection::Backward => container.offset(),
                };
                if next == self.offset {
                    return Err(BlockError::EmptyContainer {
                        id: container.id().clone(),
                        offset: self.offset,
                    });
                }
                self.offset = next;

                info!(
                    "{} at {}, {:?} bytes",
                    container.id(),
                    container.offset(),
                    container.total_size()
                );
                return Ok(container);
            }
        }

        Err(BlockError::UnknownDataFormat {
            offset: self.offset,
        })
    }
}

impl Iterator for MediumContainerIterator {
    type Item = Result<Container>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(false) => None,
            Ok(true) => {
                let next = self.read_next();
                if let Err(ref e) = next {
                    warn!("Stopping at {}: {}", self.offset, e);
                    self.done = true;
                }
                Some(next)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Child containers of a container based payload, always read forward.
pub struct PayloadContainerIterator {
    reader: Rc<DataBlockReader>,
    payload: BlockRef,
    offset: u64,
    remaining: Option<u64>,
    context: Rc<ContainerContext>,
    sequence: HashMap<BlockId, usize>,
    done: bool,
}

impl PayloadContainerIterator {
    pub fn new(
        reader: Rc<DataBlockReader>,
        payload: BlockRef,
        offset: u64,
        remaining: Option<u64>,
        context: Rc<ContainerContext>,
    ) -> Self {
        PayloadContainerIterator {
            reader,
            payload,
            offset,
            remaining,
            context,
            sequence: HashMap::new(),
            done: false,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Unknown payload sizes run until the end of the medium.
    pub fn has_next(&self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }

        match self.remaining {
            Some(remaining) => Ok(remaining > 0),
            None => Ok(!self.reader.provider().is_at_end_of_medium(self.offset)?),
        }
    }

    /// Child containers with magic keys are probed in declaration order, the
    /// default nested container of the format is the fallback.
    pub fn next_container_id(&self) -> Result<Option<BlockId>> {
        let spec = self.reader.specification();

        for child in spec.children_of(&self.payload.id) {
            if child.physical_type != PhysicalType::Container
                || (child.header_magic_keys.is_empty() && child.footer_magic_keys.is_empty())
            {
                continue;
            }

            if self.reader.has_container_with_id(
                self.offset,
                &child.id,
                Some(&self.payload),
                self.remaining,
            )? {
                return Ok(Some(child.id.clone()));
            }
        }

        Ok(spec.default_nested_container().cloned())
    }

    /// Next child container, `None` when nothing at the current offset was
    /// identified.
    pub fn read_next(&mut self) -> Result<Option<Container>> {
        let id = match self.next_container_id()? {
            Some(id) => id,
            None => return Ok(None),
        };

        let seq = self.sequence.entry(id.clone()).or_insert(0);
        let container = self.reader.read_container_with_id(
            self.offset,
            &id,
            Some(&self.payload),
            self.remaining,
            Some(self.context.clone()),
            *seq,
        )?;
        *seq += 1;

        let size = container
            .total_size()
            .ok_or_else(|| BlockError::UndeterminedSize(container.id().clone()))?;
        if size == 0 {
            return Err(BlockError::EmptyContainer {
                id: container.id().clone(),
                offset: self.offset,
            });
        }
        self.offset += size;
        self.remaining = match self.remaining {
            Some(remaining) => Some(remaining.checked_sub(size).ok_or_else(|| {
                BlockError::InsufficientBytes {
                    id: container.id().clone(),
                    needed: size,
                    remaining,
                }
            })?),
            None => None,
        };

        Ok(Some(container))
    }
}

impl Iterator for PayloadContainerIterator {
    type Item = Result<Container>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.has_next() {
            Ok(false) => return None,
            Ok(true) => self.read_next(),
            Err(e) => Err(e),
        };

        match next {
            Ok(Some(container)) => Some(Ok(container)),
            Ok(None) => {
                self.done = true;
                Some(Err(BlockError::NoChildContainer(self.payload.id.clone())))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use rcore::{MediumError, MediumStore};

use crate::error::Result;
use crate::termination::DataSupplier;

/// The readers' only way to the medium. Reads larger than `max_single_read`
/// are split into several medium reads.
#[derive(Clone)]
pub struct MediumDataProvider {
    medium: Rc<RefCell<dyn MediumStore>>,
    max_single_read: u64,
}

impl MediumDataProvider {
    pub fn new(medium: Rc<RefCell<dyn MediumStore>>, max_single_read: u64) -> Self {
        MediumDataProvider {
            medium,
            max_single_read: max_single_read.max(1),
        }
    }

    pub fn medium(&self) -> &Rc<RefCell<dyn MediumStore>> {
        &self.medium
    }

    /// Hint that reading is about to happen at `offset`. Hitting the end of
    /// the medium here is fine, the bytes that exist are cached.
    pub fn buffer_before_read(&self, offset: u64, remaining: Option<u64>) -> Result<()> {
        let size = {
            let medium = self.medium.borrow();
            remaining
                .unwrap_or(medium.max_read_block_size() as u64)
                .min(self.max_single_read)
        };
        if size == 0 {
            return Ok(());
        }

        match self.medium.borrow_mut().cache(offset, size) {
            Ok(()) => Ok(()),
            Err(MediumError::EndOfMedium {
                offset,
                requested,
                available,
            }) => {
                debug!(
                    "Buffering {} bytes at {} hit end of medium, {} available",
                    requested, offset, available
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sizes come from the data being read, so the medium has to confirm
    /// them before anything is allocated.
    pub fn get_data(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut medium = self.medium.borrow_mut();
        medium.cache(offset, size)?;

        let mut data = Vec::with_capacity(size.min(self.max_single_read) as usize);

        let mut read = 0;
        while read < size {
            let chunk = (size - read).min(self.max_single_read);
            data.extend(medium.get_data(offset + read, chunk as usize)?);
            read += chunk;
        }
        Ok(data)
    }

    pub fn is_at_end_of_medium(&self, offset: u64) -> Result<bool> {
        Ok(self.medium.borrow_mut().is_at_end_of_medium(offset)?)
    }

    pub fn cached_byte_count_at(&self, offset: u64) -> u64 {
        self.medium.borrow().cached_byte_count_at(offset)
    }

    pub fn is_random_access(&self) -> bool {
        self.medium.borrow().is_random_access()
    }

    pub fn length(&self) -> Option<u64> {
        self.medium.borrow().length()
    }

    pub fn max_read_block_size(&self) -> usize {
        self.medium.borrow().max_read_block_size()
    }

    pub fn field_supplier(&self, offset: u64, limit: Option<u64>) -> FieldDataSupplier {
        FieldDataSupplier {
            provider: self.clone(),
            offset,
            remaining: limit,
        }
    }
}

/// Feeds the bytes of one field to the termination search.
pub struct FieldDataSupplier {
    provider: MediumDataProvider,
    offset: u64,
    remaining: Option<u64>,
}

impl DataSupplier for FieldDataSupplier {
    fn next_data(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut size = max as u64;
        if let Some(remaining) = self.remaining {
            size = size.min(remaining);
        }
        if size == 0 {
            return Ok(Vec::new());
        }

        // Near the end of the medium only part of the block exists
        let available = match self.provider.medium.borrow_mut().cache(self.offset, size) {
            Ok(()) => size,
            Err(MediumError::EndOfMedium { available, .. }) => available.min(size),
            Err(e) => return Err(e.into()),
        };
        if available == 0 {
            return Ok(Vec::new());
        }

        let data = self.provider.get_data(self.offset, available)?;
        self.offset += available;
        self.remaining = self.remaining.map(|r| r - available);
        Ok(data)
    }
}

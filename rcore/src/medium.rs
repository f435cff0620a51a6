use std::io::Read;

use log::trace;
use thiserror::Error;

use crate::buf::fill_buf;

// Bytes pulled from a stream per read call
pub const STREAM_READ_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum MediumError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("end of medium at {offset}: requested {requested} bytes, {available} available")]
    EndOfMedium {
        offset: u64,
        requested: u64,
        available: u64,
    },
    #[error("medium does not support random access")]
    NotRandomAccess,
    #[error("medium is closed")]
    Closed,
}

/// Byte level access to the data being read. Offsets are absolute positions
/// from the start of the medium.
pub trait MediumStore {
    /// Ensures `size` bytes starting at `offset` are available. Running into
    /// the end of the medium is reported as [`MediumError::EndOfMedium`], the
    /// bytes that do exist stay cached.
    fn cache(&mut self, offset: u64, size: u64) -> Result<(), MediumError>;

    fn get_data(&mut self, offset: u64, size: usize) -> Result<Vec<u8>, MediumError>;

    fn cached_byte_count_at(&self, offset: u64) -> u64;

    fn is_at_end_of_medium(&mut self, offset: u64) -> Result<bool, MediumError>;

    fn is_random_access(&self) -> bool;

    /// Total length, unknown for streams until they are exhausted.
    fn length(&self) -> Option<u64>;

    fn max_read_block_size(&self) -> usize;

    fn create_offset(&self, absolute: u64) -> u64 {
        absolute
    }

    fn close(&mut self);
}

fn end_of_medium(offset: u64, requested: u64, len: u64) -> MediumError {
    MediumError::EndOfMedium {
        offset,
        requested,
        available: len.saturating_sub(offset),
    }
}

/// Random access medium over bytes held in memory.
pub struct MemoryMedium {
    data: Vec<u8>,
    closed: bool,
}

impl MemoryMedium {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryMedium {
            data,
            closed: false,
        }
    }

    fn check(&self, offset: u64, size: u64) -> Result<(), MediumError> {
        if self.closed {
            return Err(MediumError::Closed);
        }

        let len = self.data.len() as u64;
        match offset.checked_add(size) {
            Some(end) if end <= len => Ok(()),
            _ => Err(end_of_medium(offset, size, len)),
        }
    }
}

impl MediumStore for MemoryMedium {
    fn cache(&mut self, offset: u64, size: u64) -> Result<(), MediumError> {
        self.check(offset, size)
    }

    fn get_data(&mut self, offset: u64, size: usize) -> Result<Vec<u8>, MediumError> {
        self.check(offset, size as u64)?;

        let start = offset as usize;
        Ok(self.data[start..start + size].to_vec())
    }

    fn cached_byte_count_at(&self, offset: u64) -> u64 {
        (self.data.len() as u64).saturating_sub(offset)
    }

    fn is_at_end_of_medium(&mut self, offset: u64) -> Result<bool, MediumError> {
        Ok(offset >= self.data.len() as u64)
    }

    fn is_random_access(&self) -> bool {
        true
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn max_read_block_size(&self) -> usize {
        self.data.len().max(1)
    }

    fn close(&mut self) {
        self.closed = true;
        self.data = Vec::new();
    }
}

/// Forward only medium over a reader. Everything pulled from the reader is
/// kept, so earlier offsets stay readable.
pub struct StreamMedium<R: Read> {
    inner: R,
    data: Vec<u8>,
    eof: bool,
    closed: bool,
}

impl<R: Read> StreamMedium<R> {
    pub fn new(reader: R) -> Self {
        StreamMedium {
            inner: reader,
            data: Vec::new(),
            eof: false,
            closed: false,
        }
    }

    fn pull_until(&mut self, end: u64) -> Result<(), MediumError> {
        while !self.eof && (self.data.len() as u64) < end {
            let mut chunk = vec![0; STREAM_READ_BLOCK_SIZE];
            let (eof, read) = fill_buf(&mut self.inner, &mut chunk)?;

            self.data.extend_from_slice(&chunk[..read]);
            self.eof = eof;
            trace!("Stream pulled {} bytes, eof: {}", read, eof);
        }
        Ok(())
    }
}

impl<R: Read> MediumStore for StreamMedium<R> {
    fn cache(&mut self, offset: u64, size: u64) -> Result<(), MediumError> {
        if self.closed {
            return Err(MediumError::Closed);
        }

        let end = offset.saturating_add(size);
        self.pull_until(end)?;

        let len = self.data.len() as u64;
        if end > len {
            return Err(end_of_medium(offset, size, len));
        }
        Ok(())
    }

    fn get_data(&mut self, offset: u64, size: usize) -> Result<Vec<u8>, MediumError> {
        self.cache(offset, size as u64)?;

        let start = offset as usize;
        Ok(self.data[start..start + size].to_vec())
    }

    fn cached_byte_count_at(&self, offset: u64) -> u64 {
        (self.data.len() as u64).saturating_sub(offset)
    }

    fn is_at_end_of_medium(&mut self, offset: u64) -> Result<bool, MediumError> {
        if self.closed {
            return Err(MediumError::Closed);
        }

        self.pull_until(offset.saturating_add(1))?;
        Ok(self.eof && offset >= self.data.len() as u64)
    }

    fn is_random_access(&self) -> bool {
        false
    }

    fn length(&self) -> Option<u64> {
        if self.eof {
            Some(self.data.len() as u64)
        } else {
            None
        }
    }

    fn max_read_block_size(&self) -> usize {
        STREAM_READ_BLOCK_SIZE
    }

    fn close(&mut self) {
        self.closed = true;
        self.data = Vec::new();
    }
}

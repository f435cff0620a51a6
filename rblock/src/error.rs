use thiserror::Error;

use rcore::{BlockId, MediumError, SpecificationError};

#[derive(Error, Debug)]
pub enum BlockError {
    /// The format specification contradicts itself, reading cannot go on.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),
    #[error(transparent)]
    Specification(#[from] SpecificationError),

    #[error("binary to interpreted conversion failed for {id}: {reason}")]
    BinaryConversion { id: BlockId, reason: String },
    #[error("interpreted to binary conversion failed for {id}: {reason}")]
    InterpretedConversion { id: BlockId, reason: String },

    #[error(transparent)]
    Medium(#[from] MediumError),
    #[error("no known data format at offset {offset}")]
    UnknownDataFormat { offset: u64 },
    #[error("size of {0} could not be determined")]
    UndeterminedSize(BlockId),
    #[error("{id} needs {needed} bytes but only {remaining} remain")]
    InsufficientBytes {
        id: BlockId,
        needed: u64,
        remaining: u64,
    },
    #[error("{id} at {offset} is empty, reading would not advance")]
    EmptyContainer { id: BlockId, offset: u64 },
    #[error("payload {0} expects child containers but none was identified")]
    NoChildContainer(BlockId),
    #[error("context of {0} was already initialized")]
    ContextInitialized(BlockId),
}

pub type Result<T> = std::result::Result<T, BlockError>;

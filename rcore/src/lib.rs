//! Shared primitives for the schema driven container reader.
//!
//! This crate holds everything the reading engine consumes but does not own:
//! block ids, the immutable format specification model, flag bit arrays,
//! interpreted field values and the medium access abstraction.
pub mod buf;
pub mod description;
pub mod flags;
pub mod id;
pub mod medium;
pub mod spec;
pub mod value;

pub use description::{
    BlockDescription, FieldFunction, FieldFunctionKind, FieldProperties, FieldType, MagicKey,
    PhysicalType,
};
pub use flags::{BitAddress, FlagDescription, FlagSpecification, Flags};
pub use id::BlockId;
pub use medium::{MediumError, MediumStore, MemoryMedium, StreamMedium};
pub use spec::{FormatSpecification, SpecificationBuilder, SpecificationError};
pub use value::{ByteOrder, Interpreted};

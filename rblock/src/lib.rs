//! Schema driven reading of binary containers.
//!
//! A [`DataBlockReader`] walks a medium guided by a [`rcore::FormatSpecification`].
//! Sizes, counts, byte orders and character encodings that are not fixed by
//! the specification are resolved through a [`ContainerContext`] from fields
//! read earlier. Large fields and payloads are only read once they are
//! accessed.
pub mod block;
pub mod config;
pub mod context;
pub mod convert;
pub mod deferred;
pub mod error;
pub mod factory;
pub mod field;
pub mod iter;
pub mod medium_data;
pub mod reader;
pub mod termination;

pub use block::{
    Block, BlockRef, Container, FieldSequence, Footer, Header, Payload, PayloadChild, PayloadKind,
    SequenceKind,
};
pub use config::ReaderConfig;
pub use context::{ContainerContext, CountProvider, SizeProvider};
pub use error::{BlockError, Result};
pub use factory::{is_unknown_field, BlockFactory};
pub use field::Field;
pub use iter::{MediumContainerIterator, PayloadContainerIterator};
pub use reader::{DataBlockReader, ReadDirection};

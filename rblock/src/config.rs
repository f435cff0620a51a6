use serde::Deserialize;

pub const DEFAULT_LAZY_FIELD_THRESHOLD: u64 = 8 * 1024;
pub const DEFAULT_MAX_SINGLE_READ: u64 = 1024 * 1024;
pub const DEFAULT_TERMINATION_BLOCK_SIZE: usize = 512;

/// Tunables of the readers, any key left out of a config file keeps its default.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Fields larger than this are read on first access.
    pub lazy_field_threshold: u64,

    /// Largest single read issued against the medium, larger fields are
    /// read in fragments.
    pub max_single_read: u64,

    /// Bytes pulled per step while searching for a terminator.
    pub termination_block_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            lazy_field_threshold: DEFAULT_LAZY_FIELD_THRESHOLD,
            max_single_read: DEFAULT_MAX_SINGLE_READ,
            termination_block_size: DEFAULT_TERMINATION_BLOCK_SIZE,
        }
    }
}

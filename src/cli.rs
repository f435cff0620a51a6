use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use thiserror::Error;

use rblock::{BlockError, ReaderConfig};
use rcore::SpecificationError;

#[derive(Parser)]
#[command(name = "rmeta")]
#[command(about = "Dumps the container structure of binary files")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logs at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists the built in formats
    Formats,

    /// Prints every container found in a file
    Dump {
        /// File to read, ignored with --stdin
        file: Option<PathBuf>,

        /// Read from the end of the file towards its start
        #[arg(short, long)]
        backward: bool,

        /// Read a stream from stdin instead of a file
        #[arg(long)]
        stdin: bool,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Specification(#[from] SpecificationError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    #[error("{0}")]
    Usage(&'static str),
}

pub const DEFAULT_CONFIG: &str = r#"
    formats = ["ltvc", "id3v1"]

    [reader]
        lazy_field_threshold = 8192
        max_single_read = 1048576
        termination_block_size = 512
"#;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Formats to probe for, the first matching one wins.
    pub formats: Vec<String>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, CliError> {
        let config: Config = match path {
            None => toml::from_str(DEFAULT_CONFIG)?,
            Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        };

        for name in &config.formats {
            if crate::formats::find(name).is_none() {
                return Err(CliError::UnknownFormat(name.clone()));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test_config {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = Config::load(None).unwrap();

        assert_eq!(config.formats, vec!["ltvc", "id3v1"]);
        assert_eq!(config.reader, ReaderConfig::default());
    }

    #[test]
    fn partial_reader_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            formats = ["id3v1"]

            [reader]
                lazy_field_threshold = 16
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.formats, vec!["id3v1"]);
        assert_eq!(config.reader.lazy_field_threshold, 16);
        assert_eq!(
            config.reader.max_single_read,
            ReaderConfig::default().max_single_read
        );
    }

    #[test]
    fn unknown_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "formats = [\"mp4\"]").unwrap();

        assert!(matches!(
            Config::load(Some(file.path())),
            Err(CliError::UnknownFormat(name)) if name == "mp4"
        ));
    }
}

use std::cell::RefCell;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::{error, info};

use rblock::{DataBlockReader, MediumContainerIterator, ReadDirection};
use rcore::{MediumStore, MemoryMedium, StreamMedium};

mod cli;
use crate::cli::Cli;
use crate::cli::CliError;
use crate::cli::Commands;
use crate::cli::Config;

mod dump;
mod formats;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("rmeta: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    info!("Config: {:?}", config);

    match cli.command {
        Commands::Formats => {
            for name in &config.formats {
                if let Some(format) = formats::find(name) {
                    println!("{:8} {:?}\t{}", format.name, format.direction, format.about);
                }
            }
            Ok(())
        }
        Commands::Dump {
            file,
            backward,
            stdin,
        } => {
            let medium: Rc<RefCell<dyn MediumStore>> = match (stdin, file) {
                (true, _) if backward => {
                    return Err(CliError::Usage("a stream from stdin cannot be read backward"))
                }
                (true, _) => Rc::new(RefCell::new(StreamMedium::new(io::stdin().lock()))),
                (false, Some(path)) => Rc::new(RefCell::new(MemoryMedium::new(fs::read(path)?))),
                (false, None) => return Err(CliError::Usage("either a file or --stdin is needed")),
            };

            let direction = if backward {
                ReadDirection::Backward
            } else {
                ReadDirection::Forward
            };
            dump_medium(&config, medium, direction)
        }
    }
}

fn dump_medium(
    config: &Config,
    medium: Rc<RefCell<dyn MediumStore>>,
    direction: ReadDirection,
) -> Result<(), CliError> {
    let mut readers = Vec::with_capacity(config.formats.len());
    for name in &config.formats {
        let format = formats::find(name).ok_or_else(|| CliError::UnknownFormat(name.clone()))?;
        readers.push(Rc::new(DataBlockReader::new(
            format.specification()?,
            medium.clone(),
            direction,
            config.reader.clone(),
        )));
    }

    let mut out = BufWriter::new(io::stdout().lock());
    for container in MediumContainerIterator::new(readers, direction)? {
        dump::container(&mut out, &container?, 0)?;
        out.flush()?;
    }

    medium.borrow_mut().close();
    Ok(())
}

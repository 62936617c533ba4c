//! Flat binary program images: raw bytes copied to address 0, no header.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::machine::Machine;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn read_program(path: impl AsRef<Path>) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_owned(),
        source,
    })?;

    let mut program = Vec::new();
    file.read_to_end(&mut program)
        .map_err(|source| LoadError::Read {
            path: path.to_owned(),
            source,
        })?;

    Ok(program)
}

/// Reads the image at `path` into `machine`. Returns the number of bytes
/// that fit in memory.
pub fn load_program(machine: &mut Machine, path: impl AsRef<Path>) -> Result<usize, LoadError> {
    let program = read_program(path.as_ref())?;
    tracing::debug!(path = %path.as_ref().display(), size = program.len(), "program loaded");
    Ok(machine.load_program(&program))
}

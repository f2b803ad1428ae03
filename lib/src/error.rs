use std::io;

use thiserror::Error;

/// Error kinds the core distinguishes, per the error handling design.
///
/// Probe failures surface as [`Error::MaterialNotLoaded`]/[`Error::IoError`] and are
/// non-fatal to callers (the probe layer degrades to a `Score::Missing`); build
/// failures (`MissingSubTablebase`, `CorruptFile`) are fatal and meant to terminate
/// the generator with a diagnostic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("position violates game invariants: {0}")]
    InvalidPosition(String),

    #[error("material {material} has no tablebase file loaded")]
    MaterialNotLoaded { material: String },

    #[error("corrupt tablebase file: {0}")]
    CorruptFile(String),

    #[error("required sub-tablebase for material {0} is missing")]
    MissingSubTablebase(String),

    #[error(transparent)]
    IoError(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

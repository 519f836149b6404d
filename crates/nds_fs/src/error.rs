//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid archive or image
    #[error("file is an invalid archive")]
    InvalidArchive,

    /// leading byte of a compressed buffer is not a known type tag
    #[error("unknown compression type tag 0x{0:02X}")]
    UnknownCompressionTag(u8),

    /// mode string did not match `^([rwa])(b?)(\+?)$`
    #[error("invalid mode: '{0}'")]
    InvalidMode(String),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// unable to find requested folder
    #[error("folder '{0}' does not exist")]
    FolderNotFound(String),

    /// folder still holds files or subfolders
    #[error("folder '{0}' is not empty")]
    FolderNotEmpty(String),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at id {0}
    #[error("at id {0}")]
    Id(u32),

    /// by path {0}
    #[error("by path {0}")]
    Path(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

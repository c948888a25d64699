use thiserror::Error;

/// Structural failures that prevent an analysis from starting.
///
/// Resolution mismatches are never reported through this type; they are
/// modelled as problems by the analysis crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `package.json` is missing, is not valid JSON, or has an `exports`
    /// value of a shape that cannot be interpreted.
    #[error("invalid package metadata: {0}")]
    InvalidPackageMetadata(String),

    /// A path escapes the package root.
    #[error("invalid path '{0}': escapes the package root")]
    InvalidPath(String),

    /// A file was read that the virtual file system does not contain.
    #[error("file not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

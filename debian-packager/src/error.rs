// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebianError {
    /// A packaging operation failed.
    ///
    /// This is the umbrella error surfaced by high-level operations. The
    /// underlying failure, if any, is available as the error source.
    #[error("{message}")]
    Build {
        message: String,
        #[source]
        source: Option<Box<DebianError>>,
    },

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("date parsing error: {0:?}")]
    DateParse(#[from] chrono::ParseError),

    #[error("glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("control file is invalid; missing mandatory fields: {}", .0.iter().cloned().collect::<Vec<_>>().join(", "))]
    ControlInvalid(std::collections::BTreeSet<String>),

    #[error("required field missing in control file: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("control file not found in {}", .0.display())]
    ControlFileNotFound(PathBuf),

    #[error("file mapping parse error: {0}")]
    MappingParse(String),

    #[error("source does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("invalid link definition: {0}")]
    InvalidLink(String),

    #[error("tar header field {0} exceeds {1} bytes")]
    TarFieldTooLong(String, usize),

    #[error("file name is too long for tar: {0}")]
    TarLongName(String),

    #[error("numeric value too large for tar header of {0}: {1}")]
    TarBigNumber(String, u64),

    #[error("unknown tar long file mode: {0}")]
    UnknownLongFileMode(String),

    #[error("unknown tar big number mode: {0}")]
    UnknownBigNumberMode(String),

    #[error("unknown compression: {0}")]
    UnknownCompression(String),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigest(String),

    #[error("changes file parse error on line {0}: {1}")]
    ChangesParse(usize, String),

    #[error("PGP signing error: {0}")]
    Signing(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl DebianError {
    /// Construct a [DebianError::Build] with an optional cause.
    pub fn build(message: impl ToString, source: Option<DebianError>) -> Self {
        Self::Build {
            message: message.to_string(),
            source: source.map(Box::new),
        }
    }

    /// The innermost cause of this error.
    pub fn root_cause(&self) -> &DebianError {
        match self {
            Self::Build {
                source: Some(inner),
                ..
            } => inner.root_cause(),
            _ => self,
        }
    }
}

impl<W> From<std::io::IntoInnerError<W>> for DebianError {
    fn from(e: std::io::IntoInnerError<W>) -> Self {
        Self::Io(e.into())
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebianError>;

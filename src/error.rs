use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IOErrorEnum {
    NotFound,
    Exists,
    IsDirectory,
    NotDirectory,
    Cancelled,
    NotSupported,
    PermissionDenied,
    InvalidArg,
    InvalidData,
    TimedOut,
    Interrupted,
    UnexpectedEof,
    OutOfMemory,
    /// Opening or stat'ing the source file failed.
    SourceUnreadable,
    /// The image backend could not decode the data.
    DecodeFailed,
    /// A cached thumbnail failed the freshness check. Recoverable;
    /// triggers regeneration.
    Stale,
    /// An external thumbnailer exited with nonzero status or timed out.
    HelperFailed,
    /// A second image backend installation was attempted.
    BackendAlreadySet,
    Failed,
}

#[derive(Debug)]
pub struct FmError {
    domain: IOErrorEnum,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FmError {
    pub fn new(domain: IOErrorEnum, message: impl Into<String>) -> Self {
        Self {
            domain,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        domain: IOErrorEnum,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self {
            domain,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> IOErrorEnum {
        self.domain
    }

    /// Translates an OS error into the library taxonomy, prefixing the
    /// message with caller context (typically a file path).
    pub fn from_io(err: io::Error, context: impl Into<String>) -> Self {
        let base = FmError::from(err);
        FmError {
            domain: base.domain,
            message: format!("{}: {}", context.into(), base.message),
            source: base.source,
        }
    }
}

impl fmt::Display for FmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.domain, self.message)
    }
}

impl std::error::Error for FmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &dyn std::error::Error)
    }
}

impl From<io::Error> for FmError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => IOErrorEnum::NotFound,
            io::ErrorKind::PermissionDenied => IOErrorEnum::PermissionDenied,
            io::ErrorKind::AlreadyExists => IOErrorEnum::Exists,
            io::ErrorKind::InvalidInput => IOErrorEnum::InvalidArg,
            io::ErrorKind::InvalidData => IOErrorEnum::InvalidData,
            io::ErrorKind::TimedOut => IOErrorEnum::TimedOut,
            io::ErrorKind::Interrupted => IOErrorEnum::Interrupted,
            io::ErrorKind::Unsupported => IOErrorEnum::NotSupported,
            io::ErrorKind::UnexpectedEof => IOErrorEnum::UnexpectedEof,
            io::ErrorKind::OutOfMemory => IOErrorEnum::OutOfMemory,
            _ => IOErrorEnum::Failed,
        };

        Self::with_source(kind, err.to_string(), Box::new(err))
    }
}

pub type FmResult<T> = Result<T, FmError>;

//! Error types and result definitions for output mapping.
//!
//! [`OutputError`] classifies failures with an [`ErrorKind`], keeps a static description, an
//! optional dynamic detail, the remote status code when one exists, and the callsite where
//! the error was raised. Errors of several destinations are aggregated into one value so a
//! run can report every failure at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use config::load::LoadConfigError;
use config::shared::ValidationError;
use storage::ClientError;
use storage::types::InvalidTableId;

/// Result type used across output mapping.
pub type OutputResult<T> = Result<T, OutputError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    status_code: Option<u16>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of output mapping.
#[derive(Debug, Clone)]
pub struct OutputError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures of several destinations, in the order they were produced.
    Many {
        errors: Vec<OutputError>,
        location: &'static Location<'static>,
    },
}

/// Categories of output mapping failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Mapping validation errors
    ValidationError,
    SourceNotFound,
    OrphanedManifest,
    DuplicateDestination,
    DestinationResolutionFailed,
    InvalidManifest,

    // Destination errors
    StructuralChangeFailed,
    RowDeletionFailed,
    TableLoadFailed,
    MetadataUpdateFailed,
    FileUploadFailed,
    StorageRequestFailed,

    // Local processing errors
    SliceFailed,
    IoError,
    SerializationError,
    DeserializationError,
    ConfigError,

    // State & workflow errors
    InvalidState,
    LoadTaskPanic,

    Unknown,

    /// Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    InjectedFailure,
}

impl ErrorKind {
    /// Returns `true` for kinds reported before any remote mutation happens.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::ValidationError
                | ErrorKind::SourceNotFound
                | ErrorKind::OrphanedManifest
                | ErrorKind::DuplicateDestination
                | ErrorKind::DestinationResolutionFailed
                | ErrorKind::InvalidManifest
        )
    }
}

impl OutputError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the dynamic detail, or the first available one of an aggregate.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the details of every contained error.
    pub fn details(&self) -> Vec<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref().into_iter().collect(),
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.details()).collect()
            }
        }
    }

    /// Returns the status code of the remote failure behind this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.status_code,
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.status_code()),
        }
    }

    /// Returns `true` when every contained error belongs to the validation family.
    pub fn is_validation_error(&self) -> bool {
        let kinds = self.kinds();
        !kinds.is_empty() && kinds.iter().all(ErrorKind::is_validation)
    }

    /// Returns the number of errors carried, `1` for single errors.
    pub fn len(&self) -> usize {
        match self.repr {
            ErrorRepr::Single(_) => 1,
            ErrorRepr::Many { ref errors, .. } => errors.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. No effect on aggregates.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Attaches a remote status code. No effect on aggregates.
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.status_code = Some(status_code);
        }
        self
    }

    /// Prefixes the detail with `context`, using the description when no detail was set.
    ///
    /// Kind, status code and source are kept. Aggregates prefix every contained error.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        match self.repr {
            ErrorRepr::Single(ref mut payload) => {
                let detail = match payload.detail.as_deref() {
                    Some(detail) => format!("{context}: {detail}"),
                    None => format!("{context}: {}", payload.description),
                };
                payload.detail = Some(Cow::Owned(detail));
            }
            ErrorRepr::Many { ref mut errors, .. } => {
                let context = context.to_string();
                *errors = errors
                    .drain(..)
                    .map(|err| err.with_context(&context))
                    .collect();
            }
        }
        self
    }

    /// Wraps a [`ClientError`], keeping its message as detail and its status code.
    #[track_caller]
    pub fn from_client_error(
        kind: ErrorKind,
        description: &'static str,
        detail: impl Into<Cow<'static, str>>,
        err: ClientError,
    ) -> Self {
        let status_code = err.status;
        OutputError::from_components(kind, Cow::Borrowed(description), Some(detail.into()), None)
            .with_status_code(status_code)
            .with_source(err)
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        OutputError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                status_code: None,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for OutputError {
    fn eq(&self, other: &OutputError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(status_code) = payload.status_code {
                    write!(f, "\n  Status: {status_code}")?;
                }
                write_detail(payload.detail.as_deref(), f)?;
                write_backtrace(payload.backtrace.as_ref(), f)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        if line.is_empty() {
                            write!(f, "\n     ")?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for OutputError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered_backtrace = format!("{backtrace}");
    if rendered_backtrace.trim().is_empty() || rendered_backtrace.starts_with("disabled") {
        return Ok(());
    }

    write!(f, "\n  Backtrace:")?;
    for line in rendered_backtrace.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for OutputError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> OutputError {
        OutputError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for OutputError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> OutputError {
        OutputError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for OutputError
where
    E: Into<OutputError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> OutputError {
        let location = Location::caller();

        let mut errors: Vec<OutputError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        OutputError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<ClientError> for OutputError {
    #[track_caller]
    fn from(err: ClientError) -> OutputError {
        let detail = err.message.clone();
        OutputError::from_client_error(
            ErrorKind::StorageRequestFailed,
            "Storage request failed",
            detail,
            err,
        )
    }
}

impl From<ValidationError> for OutputError {
    #[track_caller]
    fn from(err: ValidationError) -> OutputError {
        let detail = err.to_string();
        OutputError::from_components(
            ErrorKind::ValidationError,
            Cow::Borrowed("Invalid output mapping configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<LoadConfigError> for OutputError {
    #[track_caller]
    fn from(err: LoadConfigError) -> OutputError {
        let detail = err.to_string();
        OutputError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Loading configuration failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<InvalidTableId> for OutputError {
    #[track_caller]
    fn from(err: InvalidTableId) -> OutputError {
        let detail = err.to_string();
        OutputError::from_components(
            ErrorKind::DestinationResolutionFailed,
            Cow::Borrowed("Invalid table id"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::io::Error> for OutputError {
    #[track_caller]
    fn from(err: std::io::Error) -> OutputError {
        let detail = err.to_string();
        OutputError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps syntax and data errors to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for OutputError {
    #[track_caller]
    fn from(err: serde_json::Error) -> OutputError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        OutputError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_yaml::Error> for OutputError {
    #[track_caller]
    fn from(err: serde_yaml::Error) -> OutputError {
        let detail = err.to_string();
        OutputError::from_components(
            ErrorKind::DeserializationError,
            Cow::Borrowed("YAML deserialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<csv::Error> for OutputError {
    #[track_caller]
    fn from(err: csv::Error) -> OutputError {
        let kind = if err.is_io_error() {
            ErrorKind::IoError
        } else {
            ErrorKind::DeserializationError
        };

        let detail = err.to_string();
        OutputError::from_components(
            kind,
            Cow::Borrowed("CSV processing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

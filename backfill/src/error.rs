//! Error types and result definitions for backfill operations.
//!
//! [`BackfillError`] carries an [`ErrorKind`] classification, a static description, optional
//! dynamic detail, an optional source error, the callsite that created it and a captured
//! backtrace. Several errors can be aggregated into one, which is used when cleanup after a
//! failure fails as well.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type BackfillResult<T> = Result<T, BackfillError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the backfill engine.
#[derive(Debug, Clone)]
pub struct BackfillError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<BackfillError>,
        location: &'static Location<'static>,
    },
}

/// Classification of backfill failures.
///
/// Every kind is fatal for the run; the kind tells the operator which side or which phase of
/// the table load failed.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query Errors
    SourceQueryFailed,
    DestinationQueryFailed,

    // Schema Errors
    SourceTableMissing,
    DestinationTableMissing,
    SchemaMismatch,

    // Load Errors
    PipelineStageFailed,
    DestinationTransactionFailed,
    VerificationFailed,

    // Configuration Errors
    ConfigError,

    // IO & Conversion Errors
    IoError,
    ConversionError,

    InvalidState,
    Unknown,

    /// Raised by fail points in tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl BackfillError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the dynamic detail, or for aggregates the first detail found.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|err| err.detail()),
        }
    }

    /// Returns the aggregated errors, or [`None`] for a single error.
    pub fn errors(&self) -> Option<&[BackfillError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the backtrace captured when a single error was created.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// No effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        BackfillError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        BackfillError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for BackfillError {
    fn eq(&self, other: &BackfillError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for BackfillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    if body.trim().is_empty() {
        return write!(f, " <empty>");
    }
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for BackfillError {
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

impl From<(ErrorKind, &'static str)> for BackfillError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> BackfillError {
        BackfillError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for BackfillError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> BackfillError {
        BackfillError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for BackfillError
where
    E: Into<BackfillError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> BackfillError {
        let location = Location::caller();
        let mut errors: Vec<BackfillError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        BackfillError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for BackfillError {
    #[track_caller]
    fn from(err: std::io::Error) -> BackfillError {
        BackfillError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<std::num::ParseIntError> for BackfillError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> BackfillError {
        BackfillError::from_source(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

/// Converts [`sqlx::Error`] without knowing which side produced it.
///
/// Adapters map driver errors to a side specific kind themselves; this fallback is used for
/// queries that are neither.
impl From<sqlx::Error> for BackfillError {
    #[track_caller]
    fn from(err: sqlx::Error) -> BackfillError {
        let kind = match &err {
            sqlx::Error::Io(_) => ErrorKind::IoError,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::SourceConnectionFailed
            }
            _ => ErrorKind::SourceQueryFailed,
        };
        BackfillError::from_source(kind, "Database operation failed", err)
    }
}

impl From<backfill_postgres::schema::SchemaError> for BackfillError {
    #[track_caller]
    fn from(err: backfill_postgres::schema::SchemaError) -> BackfillError {
        use backfill_postgres::schema::SchemaError;

        let (kind, description) = match &err {
            SchemaError::TableNotFound(_) => (
                ErrorKind::SourceTableMissing,
                "Source table not found in information_schema",
            ),
            SchemaError::Database(sqlx_err) if is_connection_error(sqlx_err) => (
                ErrorKind::SourceConnectionFailed,
                "Postgres connection failed",
            ),
            SchemaError::Database(_) => (ErrorKind::SourceQueryFailed, "Postgres query failed"),
        };
        BackfillError::from_source(kind, description, err)
    }
}

impl From<backfill_mysql::schema::SchemaError> for BackfillError {
    #[track_caller]
    fn from(err: backfill_mysql::schema::SchemaError) -> BackfillError {
        use backfill_mysql::schema::SchemaError;

        let (kind, description) = match &err {
            SchemaError::TableNotFound(_) => (
                ErrorKind::DestinationTableMissing,
                "Destination table not found in information_schema",
            ),
            SchemaError::Database(sqlx_err) if is_connection_error(sqlx_err) => (
                ErrorKind::DestinationConnectionFailed,
                "MemSQL connection failed",
            ),
            SchemaError::Database(_) => {
                (ErrorKind::DestinationQueryFailed, "MemSQL query failed")
            }
        };
        BackfillError::from_source(kind, description, err)
    }
}

/// Returns `true` for driver errors caused by the transport rather than the statement.
pub(crate) fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
    )
}

/// Wraps a driver error raised by the destination session under `kind`.
#[track_caller]
pub(crate) fn destination_error(
    kind: ErrorKind,
    description: &'static str,
    err: sqlx::Error,
) -> BackfillError {
    let kind = if is_connection_error(&err) {
        ErrorKind::DestinationConnectionFailed
    } else {
        kind
    };
    BackfillError::from_source(kind, description, err)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::backfill_error;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = backfill_error!(
            ErrorKind::SchemaMismatch,
            "Column sets differ",
            "table accounts"
        );

        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert_eq!(err.description(), "Column sets differ");
        assert_eq!(err.detail(), Some("table accounts"));
        assert!(err.errors().is_none());
        assert!(err.to_string().contains("[SchemaMismatch] Column sets differ"));
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let err = BackfillError::from(vec![
            backfill_error!(ErrorKind::PipelineStageFailed, "Stage failed"),
            backfill_error!(ErrorKind::DestinationTransactionFailed, "Rollback failed"),
        ]);

        assert_eq!(err.kind(), ErrorKind::PipelineStageFailed);
        assert_eq!(
            err.kinds(),
            vec![
                ErrorKind::PipelineStageFailed,
                ErrorKind::DestinationTransactionFailed
            ]
        );
        assert_eq!(err.errors().map(<[_]>::len), Some(2));
        assert!(err.source().is_some());
    }

    #[test]
    fn single_element_aggregate_is_unwrapped() {
        let err = BackfillError::from(vec![backfill_error!(ErrorKind::IoError, "Boom")]);

        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::IoError);
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = BackfillError::from(std::io::Error::other("pipe closed"));

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.detail(), Some("pipe closed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn missing_destination_table_is_classified() {
        let err = BackfillError::from(backfill_mysql::schema::SchemaError::TableNotFound(
            "indexer.accounts".to_string(),
        ));

        assert_eq!(err.kind(), ErrorKind::DestinationTableMissing);
    }
}

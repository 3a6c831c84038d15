use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use backfill::error::BackfillError;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Backtrace captured when a non-engine error is wrapped.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the loader binary.
#[derive(Debug)]
pub enum LoaderError {
    /// A table load or one of its preconditions failed.
    Backfill(BackfillError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
    /// The run was stopped by a signal before it finished.
    Interrupted(&'static str),
}

impl LoaderError {
    pub fn category(&self) -> &'static str {
        match self {
            LoaderError::Backfill(_) => "backfill error",
            LoaderError::Config(_, _) => "configuration error",
            LoaderError::Io(_, _) => "i/o error",
            LoaderError::Interrupted(_) => "interrupted",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            LoaderError::Backfill(err) => err.backtrace(),
            LoaderError::Config(_, cb) => Some(&cb.0),
            LoaderError::Io(_, cb) => Some(&cb.0),
            LoaderError::Interrupted(_) => None,
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        LoaderError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output, with causes and, when enabled, the backtrace.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("backfill failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        if !matches!(self, LoaderError::Backfill(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Backfill(err) => write!(f, "{err}"),
            LoaderError::Config(source, _) => write!(f, "configuration error: {source}"),
            LoaderError::Io(source, _) => write!(f, "i/o error: {source}"),
            LoaderError::Interrupted(signal) => write!(f, "interrupted by {signal}"),
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoaderError::Backfill(err) => err.source(),
            LoaderError::Config(source, _) => Some(source.as_ref()),
            LoaderError::Io(source, _) => Some(source),
            LoaderError::Interrupted(_) => None,
        }
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<BackfillError> for LoaderError {
    fn from(err: BackfillError) -> Self {
        LoaderError::Backfill(err)
    }
}

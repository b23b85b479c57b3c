use std::error;
use std::fmt;

/// Errors encountered while interacting with the wheel.
///
/// Scheduling itself is infallible; the only failure the crate surfaces is an
/// invalid cron expression handed to [`Wheel::cron`].
///
/// [`Wheel::cron`]: struct.Wheel.html#method.cron
#[derive(Debug)]
pub struct Error(Kind);

#[derive(Debug)]
enum Kind {
    Parse(cron::error::Error),
}

impl Error {
    /// Create an error representing an unparseable cron expression.
    pub(crate) fn parse(err: cron::error::Error) -> Error {
        Error(Kind::Parse(err))
    }

    /// Returns `true` if the error was caused by an unparseable cron
    /// expression.
    pub fn is_parse(&self) -> bool {
        match self.0 {
            Kind::Parse(_) => true,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Kind::Parse(ref err) => write!(fmt, "invalid cron expression: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.0 {
            Kind::Parse(ref err) => Some(err),
        }
    }
}

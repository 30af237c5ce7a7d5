//! Terminal failure type for the retry engine

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// How a retry loop came to a stop without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// Every allowed attempt ran and the last one failed.
    Exhausted,
    /// The cancel check fired between attempts.
    Cancelled,
    /// The predicate classified the error as permanent.
    Rejected,
}

/// Failure of a retried operation, generic over the operation's own
/// error type `E`.
///
/// One struct covers the three ways a loop ends early; accessors tell
/// them apart without exposing the internal shape.
#[derive(Debug)]
pub struct RetryError<E> {
    halt: Halt,
    attempts: u32,
    elapsed: Duration,
    source: Option<E>,
}

impl<E> RetryError<E> {
    pub(crate) fn exhausted(attempts: u32, source: E, elapsed: Duration) -> Self {
        Self {
            halt: Halt::Exhausted,
            attempts,
            elapsed,
            source: Some(source),
        }
    }

    pub(crate) fn cancelled(attempts: u32, last_seen: Option<E>) -> Self {
        Self {
            halt: Halt::Cancelled,
            attempts,
            elapsed: Duration::ZERO,
            source: last_seen,
        }
    }

    pub(crate) fn rejected(source: E) -> Self {
        Self {
            halt: Halt::Rejected,
            attempts: 1,
            elapsed: Duration::ZERO,
            source: Some(source),
        }
    }

    /// How many attempts actually ran.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when the attempt ceiling was reached.
    pub fn is_exhausted(&self) -> bool {
        self.halt == Halt::Exhausted
    }

    /// True when the cancel check stopped the loop.
    pub fn is_cancelled(&self) -> bool {
        self.halt == Halt::Cancelled
    }

    /// True when the error was permanent and never worth retrying.
    pub fn is_rejected(&self) -> bool {
        self.halt == Halt::Rejected
    }

    /// The last underlying error, if one was seen.
    ///
    /// A loop cancelled before any attempt carries no source.
    pub fn into_source(self) -> Option<E> {
        self.source
    }

    /// Borrowing accessor for the last underlying error.
    pub fn source_ref(&self) -> Option<&E> {
        self.source.as_ref()
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.halt, &self.source) {
            (Halt::Exhausted, Some(err)) => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                self.attempts,
                self.elapsed.as_secs_f64(),
                err
            ),
            (Halt::Cancelled, Some(err)) => {
                write!(f, "retry cancelled after {} attempts: {}", self.attempts, err)
            }
            (Halt::Cancelled, None) => {
                write!(f, "retry cancelled after {} attempts", self.attempts)
            }
            (Halt::Rejected, Some(err)) => write!(f, "permanent error, not retried: {}", err),
            // Exhausted and Rejected always carry a source.
            (_, None) => write!(f, "retry failed after {} attempts", self.attempts),
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|err| err as &(dyn StdError + 'static))
    }
}

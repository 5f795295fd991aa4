//! Structured records of message retrievals.
//!
//! Every time a context asks the native library for a message, it records one
//! [`RetrievalEntry`]: which code, through which channel, whether the library
//! had text, and whether the buffer was released. Entries are small `Copy`
//! values and never hold message text, only its length.
//!
//! Entries render as a single line through [`RetrievalEntry::write_to`], which
//! writes straight into any `fmt::Write` sink:
//!
//! ```text
//! [1718000000] code=2 channel=direct outcome=native released=true bytes=12
//! ```

use crate::models::ErrorChannel;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// What a retrieval produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalOutcome {
    /// The library returned text.
    Native {
        /// Whether the buffer was handed back through `DeleteErrorMessage`.
        released: bool,
    },
    /// No native text; the fallback template was used.
    Fallback,
}

impl RetrievalOutcome {
    /// Whether a native buffer was released.
    #[inline]
    pub const fn released(self) -> bool {
        matches!(self, Self::Native { released: true })
    }

    /// Whether the fallback template was used.
    #[inline]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback)
    }
}

/// One message retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalEntry {
    /// Unix timestamp of the retrieval
    pub timestamp: u64,
    /// Error code that was looked up
    pub code: i32,
    /// Channel the code was read from, `None` when the caller supplied it
    pub channel: Option<ErrorChannel>,
    /// Result of the lookup
    pub outcome: RetrievalOutcome,
    /// Length of the resulting message in bytes
    pub message_bytes: usize,
}

impl RetrievalEntry {
    /// Entry stamped with the current time.
    pub fn new(
        code: i32,
        channel: Option<ErrorChannel>,
        outcome: RetrievalOutcome,
        message_bytes: usize,
    ) -> Self {
        Self {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            code,
            channel,
            outcome,
            message_bytes,
        }
    }

    /// Write the entry as one structured line.
    pub fn write_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(
            f,
            "[{}] code={} channel={}",
            self.timestamp,
            self.code,
            self.channel.map_or("direct", ErrorChannel::as_str)
        )?;

        match self.outcome {
            RetrievalOutcome::Native { released } => {
                write!(f, " outcome=native released={}", released)?;
            }
            RetrievalOutcome::Fallback => f.write_str(" outcome=fallback")?,
        }

        write!(f, " bytes={}", self.message_bytes)
    }
}

impl fmt::Display for RetrievalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_to(f)
    }
}

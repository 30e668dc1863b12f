//! Define errors that can happen while using the ftp-client crate.

use thiserror::Error;

/// A generic client error. Every way a session, command, or data transfer
/// can fail has a variant here.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a reply code in `[400, 599]`.
    #[error("server returned {code}: {text}")]
    Protocol {
        /// The three-digit reply code.
        code: u16,
        /// The reply text (all lines of a multi-line reply, newline-separated).
        text: String,
    },

    /// A reply could not be parsed into the shape a command expected,
    /// e.g. a malformed PASV reply, or a transfer command answered with
    /// something other than a mark.
    #[error("{0}")]
    Parse(String),

    /// The underlying TCP connection failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A data socket (or, in principle, the control socket) sat idle past
    /// its timeout.
    #[error("{0}")]
    Timeout(String),

    /// Caller misuse: local file missing, local path is a directory,
    /// already authenticating, `put` without a source, etc.
    #[error("{0}")]
    Usage(String),
}

impl Error {
    /// Build a [`Error::Protocol`] from a parsed [`crate::response::Response`].
    pub fn protocol(code: u16, text: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            text: text.into(),
        }
    }

    /// True if this error carries a protocol reply code in `[400, 599]`.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }
}

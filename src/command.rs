//! The unit of work the [`crate::dispatcher::Dispatcher`] serializes:
//! one FTP command line, paired with whatever completion the caller is
//! waiting on.
//!
//! A caller's completion is modeled as a [`tokio::sync::oneshot`] channel
//! rather than a boxed callback: `oneshot::Sender::send` consumes `self`,
//! so "fire at most once" falls out of the type instead of needing a
//! hand-rolled guard (spec's "once-wrapped callback" becomes a one-shot
//! future whose resolution is naturally idempotent).

use std::collections::HashSet;

use tokio::sync::oneshot;

use crate::error::Error;
use crate::response::Response;

/// Describes the preliminary "mark" reply a transfer command expects
/// before its (suppressed) terminal reply.
#[derive(Debug, Clone)]
pub struct ExpectMark {
    /// Reply codes that count as the mark (typically `{125, 150}`).
    pub marks: HashSet<u16>,
    /// A terminal reply code to silently swallow once the mark has been
    /// seen (typically `226`), because the data socket's close is the
    /// caller's real completion signal.
    pub ignore: Option<u16>,
}

impl ExpectMark {
    /// The mark expectation used by `RETR`/`STOR`/`STOU`/`APPE`/`LIST`/`NLST`.
    pub fn transfer() -> Self {
        ExpectMark {
            marks: [125, 150].iter().copied().collect(),
            ignore: Some(226),
        }
    }
}

/// A queued command: the line to write, how its reply should be paired
/// (§4.3 of the spec), and the channel(s) its result is delivered on.
///
/// Both `terminal` and `mark` are `Result`-typed so a transfer command
/// that never reaches its mark — e.g. the server answers a `RETR` with
/// `550 No such file` instead of `125`/`150` — still delivers the real
/// protocol error to the caller waiting on the mark receiver, rather
/// than having that receiver dropped silently.
pub(crate) struct Command {
    pub line: String,
    pub expect_mark: Option<ExpectMark>,
    terminal: Option<oneshot::Sender<Result<Response, Error>>>,
    mark: Option<oneshot::Sender<Result<Response, Error>>>,
}

impl Command {
    /// A command that expects a single terminal reply.
    pub fn simple(line: impl Into<String>) -> (Command, oneshot::Receiver<Result<Response, Error>>) {
        let (tx, rx) = oneshot::channel();
        (
            Command {
                line: line.into(),
                expect_mark: None,
                terminal: Some(tx),
                mark: None,
            },
            rx,
        )
    }

    /// A command that expects a mark followed by a suppressed terminal
    /// reply. The returned receiver yields the mark response, which is
    /// when the caller may start driving the paired data socket — or the
    /// protocol/parse error the server sent instead of a mark.
    pub fn transfer(
        line: impl Into<String>,
        expect_mark: ExpectMark,
    ) -> (Command, oneshot::Receiver<Result<Response, Error>>) {
        let (tx, rx) = oneshot::channel();
        (
            Command {
                line: line.into(),
                expect_mark: Some(expect_mark),
                terminal: None,
                mark: Some(tx),
            },
            rx,
        )
    }

    /// Deliver a result to whichever completion channel this command
    /// still holds: the terminal sender for a plain command, or the mark
    /// sender for a transfer command that is popped off the queue before
    /// ever receiving its mark. A no-op if both have already fired.
    pub fn resolve(self, result: Result<Response, Error>) {
        if let Some(tx) = self.terminal {
            let _ = tx.send(result);
        } else if let Some(tx) = self.mark {
            let _ = tx.send(result);
        }
    }

    /// Deliver the mark reply. A no-op if this isn't a transfer command,
    /// or if the mark was already delivered.
    pub fn resolve_mark(&mut self, response: Response) {
        if let Some(tx) = self.mark.take() {
            let _ = tx.send(Ok(response));
        }
    }
}

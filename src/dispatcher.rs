//! The command queue and response-pairing state machine (spec §4.3).
//!
//! Single-threaded cooperative dispatch: `queue[0]` is always the
//! in-flight command, `in_progress` gates writes, and every response the
//! parser yields is paired against the queue head by [`Dispatcher::pump_replies`].
//! The implicit auth chain (§4.3.1) is run once, before the first
//! non-auth command, and is interleaved transparently with user calls.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::command::{Command, ExpectMark};
use crate::control::ControlChannel;
use crate::error::Error;
use crate::response::Response;

const AUTH_PREFIXES: &[&str] = &["feat", "syst", "user", "pass", "acct"];

/// Outcome of the implicit auth chain, cached on the dispatcher so it
/// only ever runs once per connection.
#[derive(Debug, Default)]
pub(crate) struct AuthState {
    pub authenticated: bool,
    pub authenticating: bool,
    pub features: Option<Vec<String>>,
    pub system: Option<String>,
}

/// Serializes command execution over one [`ControlChannel`].
pub(crate) struct Dispatcher {
    control: ControlChannel,
    queue: VecDeque<Command>,
    in_progress: bool,
    ignore_next_code: Option<u16>,
    auth: AuthState,
    user: String,
    pass: String,
}

impl Dispatcher {
    pub fn new(control: ControlChannel, user: String, pass: String) -> Self {
        Dispatcher {
            control,
            queue: VecDeque::new(),
            in_progress: false,
            ignore_next_code: None,
            auth: AuthState::default(),
            user,
            pass,
        }
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    /// Enqueue a plain command and drive the dispatcher until it
    /// completes, returning its terminal reply (or protocol error).
    ///
    /// This implements the `execute` enqueue path of spec §4.3: if the
    /// command isn't itself part of the auth chain and we aren't
    /// authenticated yet, the implicit chain runs first.
    pub async fn execute(&mut self, line: impl Into<String>) -> Result<Response, Error> {
        let line = line.into();
        self.maybe_authenticate(&line).await?;

        let (command, rx) = Command::simple(line);
        self.enqueue_and_drive_for(command, rx).await?
    }

    /// Enqueue a transfer command (`RETR`/`STOR`/`LIST`/...), returning
    /// the mark reply once it arrives. The command stays at the head of
    /// the queue after that — gating further writes — until its
    /// suppressed terminal reply is read back on a later dispatch pass
    /// (spec §4.3/§4.4); the caller's real completion signal is the data
    /// socket closing, not that terminal reply.
    pub async fn execute_transfer(
        &mut self,
        line: impl Into<String>,
        expect_mark: ExpectMark,
    ) -> Result<Response, Error> {
        let line = line.into();
        self.maybe_authenticate(&line).await?;

        let (command, rx) = Command::transfer(line, expect_mark);
        self.enqueue_and_drive_for(command, rx).await?
    }

    async fn enqueue_and_drive_for<T>(
        &mut self,
        command: Command,
        rx: tokio::sync::oneshot::Receiver<T>,
    ) -> Result<T, Error> {
        self.queue.push_back(command);
        self.pump_writes().await?;

        // Drive the read loop until our own receiver resolves. Replies
        // for other queued commands resolve their own receivers along
        // the way; we just keep pumping until ours does.
        tokio::pin!(rx);
        loop {
            tokio::select! {
                biased;
                result = &mut rx => {
                    return result.map_err(|_| Error::Parse("command dropped before completion".into()));
                }
                response = self.control.recv() => {
                    match response {
                        Some(Ok(response)) => self.pair_response(response).await?,
                        Some(Err(err)) => return Err(err),
                        None => return Err(Error::Io(std::io::Error::new(
                            std::io::ErrorKind::ConnectionAborted,
                            "control channel closed",
                        ))),
                    }
                }
            }
        }
    }

    /// Write `queue[0]`'s line if nothing is currently in flight.
    async fn pump_writes(&mut self) -> Result<(), Error> {
        if self.in_progress {
            return Ok(());
        }
        if let Some(head) = self.queue.front() {
            let line = head.line.clone();
            self.control.send(&line).await?;
            self.in_progress = true;
        }
        Ok(())
    }

    /// Pair one parsed response against the queue head (spec §4.3).
    async fn pair_response(&mut self, response: Response) -> Result<(), Error> {
        if self.queue.is_empty() {
            trace!("dropping {} {}: queue empty", response.code, response.text);
            return Ok(());
        }
        if response.code == 220 {
            trace!("dropping unsolicited 220 greeting");
            return Ok(());
        }

        if response.is_mark {
            let accepts = self
                .queue
                .front()
                .and_then(|c| c.expect_mark.as_ref())
                .map(|expect| expect.marks.contains(&response.code))
                .unwrap_or(false);
            if !accepts {
                debug!("dropping unexpected mark {}", response.code);
                return Ok(());
            }
            let head = self.queue.front_mut().expect("checked above");
            let ignore = head.expect_mark.as_ref().and_then(|e| e.ignore);
            head.resolve_mark(response);
            if let Some(ignore) = ignore {
                self.ignore_next_code = Some(ignore);
            }
            // The data transfer is now in flight on a separate socket;
            // let the next queued command write once this one finishes
            // via `settle_transfer`/the suppressed terminal below.
            return Ok(());
        }

        if self.ignore_next_code == Some(response.code) {
            trace!("swallowing suppressed terminal {}", response.code);
            self.ignore_next_code = None;
            self.pop_and_advance();
            self.pump_writes().await?;
            return Ok(());
        }

        let command = self.queue.pop_front().expect("checked non-empty above");
        let result = if response.is_error {
            Err(Error::protocol(response.code, response.text.clone()))
        } else {
            Ok(response)
        };
        command.resolve(result);
        self.in_progress = false;
        self.pump_writes().await?;
        Ok(())
    }

    /// Close the control socket and drop all session state, for
    /// [`crate::session::Session::destroy`]. Any queued commands are
    /// dropped without resolving their receivers.
    pub fn reset(&mut self) {
        self.control.close();
        self.queue.clear();
        self.in_progress = false;
        self.ignore_next_code = None;
        self.auth = AuthState::default();
    }

    fn pop_and_advance(&mut self) {
        self.queue.pop_front();
        self.in_progress = false;
    }

    /// Run the implicit auth chain (§4.3.1) if needed before `line`.
    async fn maybe_authenticate(&mut self, line: &str) -> Result<(), Error> {
        if self.auth.authenticated {
            return Ok(());
        }
        let command_word = line.split_whitespace().next().unwrap_or("").to_lowercase();
        if AUTH_PREFIXES.iter().any(|p| *p == command_word) {
            return Ok(());
        }
        Box::pin(self.authenticate()).await
    }

    /// Explicitly trigger the implicit auth chain, e.g. from
    /// [`crate::session::Session::auth`]. A no-op if already
    /// authenticated.
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        if self.auth.authenticated {
            return Ok(());
        }
        if self.auth.authenticating {
            return Err(Error::Usage("already authenticating".into()));
        }
        self.run_auth_chain().await
    }

    async fn run_auth_chain(&mut self) -> Result<(), Error> {
        self.auth.authenticating = true;
        let result = self.run_auth_chain_inner().await;
        self.auth.authenticating = false;
        result
    }

    async fn run_auth_chain_inner(&mut self) -> Result<(), Error> {
        if self.auth.features.is_none() {
            self.auth.features = Some(self.probe_features().await);
        }

        if let Ok(response) = self.execute("SYST".to_string()).await {
            if response.code == 215 {
                self.auth.system = Some(response.text.to_lowercase());
            }
        }

        let user_cmd = format!("USER {}", self.user);
        let response = self.execute(user_cmd).await?;
        match response.code {
            230 => self.auth.authenticated = true,
            331 | 332 => {
                let pass_cmd = format!("PASS {}", self.pass);
                let response = self.execute(pass_cmd).await?;
                match response.code {
                    230 | 202 => self.auth.authenticated = true,
                    332 => {
                        // Best-effort; RFC959 ACCT support is not standardized
                        // and this branch never resolves a caller's callback
                        // (see DESIGN.md's Open Question Decisions).
                        let _ = self.execute("ACCT ".to_string()).await;
                    }
                    _ => {
                        return Err(Error::protocol(response.code, response.text));
                    }
                }
            }
            _ => return Err(Error::protocol(response.code, response.text)),
        }

        if self.auth.authenticated {
            self.execute("TYPE I".to_string()).await?;
        }
        Ok(())
    }

    async fn probe_features(&mut self) -> Vec<String> {
        match self.execute("FEAT".to_string()).await {
            Ok(response) => {
                let mut lines: Vec<&str> = response.text.lines().collect();
                if lines.len() >= 2 {
                    lines.remove(0);
                    lines.pop();
                }
                lines
                    .into_iter()
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect()
            }
            Err(err) => {
                warn!("FEAT probe failed, continuing with no features: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use tokio::net::TcpListener;

    async fn dispatcher_with_live_socket() -> Dispatcher {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while listener.accept().await.is_ok() {}
        });
        let control = ControlChannel::connect("127.0.0.1".to_string(), addr.port(), EventBus::new())
            .await
            .unwrap();
        Dispatcher::new(control, "anonymous".to_string(), "@anonymous".to_string())
    }

    #[tokio::test]
    async fn drops_220_with_empty_queue_without_error() {
        let mut dispatcher = dispatcher_with_live_socket().await;
        dispatcher
            .pair_response(Response::new(220, "ready"))
            .await
            .unwrap();
        assert!(dispatcher.queue.is_empty());
    }

    #[tokio::test]
    async fn unexpected_mark_is_dropped_without_advancing_queue() {
        let mut dispatcher = dispatcher_with_live_socket().await;

        let (command, rx) = Command::simple("PWD".to_string());
        dispatcher.queue.push_back(command);
        dispatcher.in_progress = true;

        // PWD doesn't expect a mark, so this 150 must be dropped rather
        // than resolved as its terminal reply.
        dispatcher
            .pair_response(Response::new(150, "opening"))
            .await
            .unwrap();
        assert_eq!(dispatcher.queue.len(), 1);

        dispatcher
            .pair_response(Response::new(257, "\"/\" is current directory"))
            .await
            .unwrap();
        let resolved = rx.await.unwrap().unwrap();
        assert_eq!(resolved.code, 257);
        assert!(dispatcher.queue.is_empty());
    }

    #[tokio::test]
    async fn mark_resolves_without_popping_until_suppressed_terminal() {
        let mut dispatcher = dispatcher_with_live_socket().await;

        let (command, rx) = Command::transfer("STOR /tmp/a".to_string(), ExpectMark::transfer());
        dispatcher.queue.push_back(command);
        dispatcher.in_progress = true;

        dispatcher
            .pair_response(Response::new(150, "ok"))
            .await
            .unwrap();
        let mark = rx.await.unwrap().unwrap();
        assert_eq!(mark.code, 150);
        assert_eq!(dispatcher.queue.len(), 1, "command stays queued while the transfer is in flight");
        assert!(dispatcher.in_progress);

        dispatcher
            .pair_response(Response::new(226, "done"))
            .await
            .unwrap();
        assert!(dispatcher.queue.is_empty());
        assert!(!dispatcher.in_progress);
    }
}

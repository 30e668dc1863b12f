//! The high-level facade: `auth`, `list`, `get`, `put`, `ls`, `rename`,
//! `raw`, `keep_alive`, `destroy` (spec §4.5), built by composing the
//! dispatcher and passive data channel.

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use tokio::fs::File;
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::control::ControlChannel;
use crate::dispatcher::Dispatcher;
use crate::entries::{parse_entries, FileEntry};
use crate::error::Error;
use crate::events::{Event, EventBus, EventReceiver, Progress, TransferAction};
use crate::nfc::nfc;
use crate::passive::PassiveSocket;
use crate::response::Response;

/// A long-lived FTP session: one control connection, serialized command
/// dispatch, and on-demand passive data connections.
pub struct Session {
    config: SessionConfig,
    dispatcher: Arc<Mutex<Dispatcher>>,
    events: EventBus,
    type_: Option<char>,
    use_list: bool,
    keep_alive: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    /// Open the control connection. Authentication is not performed
    /// here — it runs implicitly before the first non-auth command, per
    /// spec §3's lifecycle rule.
    pub async fn connect(config: SessionConfig) -> Result<Self, Error> {
        let events = EventBus::new();
        let control = ControlChannel::connect(config.host.clone(), config.port, events.clone()).await?;
        let dispatcher = Dispatcher::new(control, config.user.clone(), config.pass.clone());
        let use_list = config.use_list;
        Ok(Session {
            config,
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            events,
            type_: None,
            use_list,
            keep_alive: None,
        })
    }

    /// Subscribe to session-level events (`connect`, `timeout`, `error`,
    /// `data`, `progress`).
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Explicitly run the implicit auth chain. A no-op if already
    /// authenticated; fails with a usage error if auth is already in
    /// flight (spec §4.3.1).
    pub async fn auth(&mut self) -> Result<(), Error> {
        self.dispatcher.lock().await.authenticate().await
    }

    /// True if the server's `FEAT` reply (lowercased) listed `feature`.
    pub async fn has_feat(&self, feature: &str) -> bool {
        let wanted = feature.to_lowercase();
        self.dispatcher
            .lock()
            .await
            .auth_state()
            .features
            .as_ref()
            .map(|features| features.iter().any(|f| f == &wanted))
            .unwrap_or(false)
    }

    /// Issue a raw command: `cmd` and `args` joined with spaces.
    pub async fn raw(&mut self, cmd: &str, args: &[&str]) -> Result<Response, Error> {
        let mut line = cmd.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.dispatcher.lock().await.execute(line.trim().to_string()).await
    }

    /// Set the transfer type (`'A'` or `'I'`), skipping the round trip if
    /// it's already set.
    pub async fn set_type(&mut self, type_: char) -> Result<(), Error> {
        if self.type_ == Some(type_) {
            return Ok(());
        }
        self.dispatcher
            .lock()
            .await
            .execute(format!("TYPE {}", type_))
            .await?;
        self.type_ = Some(type_);
        Ok(())
    }

    /// List `path` (server-chosen format) over a passive data
    /// connection.
    pub async fn list(&mut self, path: &str) -> Result<String, Error> {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        let line = transfer_line("LIST", path);
        socket.await_mark(&mut dispatcher, line).await?;
        drop(dispatcher);

        let mut buf = Vec::new();
        socket.read_to_end(&mut buf).await?;
        String::from_utf8(buf).map_err(|_| Error::Parse("invalid utf-8 in directory listing".to_string()))
    }

    /// Download `remote` into memory, reporting `progress` events as it
    /// streams in.
    pub async fn get(&mut self, remote: &str) -> Result<Vec<u8>, Error> {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        socket.await_mark(&mut dispatcher, transfer_line("RETR", remote)).await?;
        drop(dispatcher);

        let filename = remote.to_string();
        let events = self.events.clone();
        let mut buf = Vec::new();
        socket
            .read_to_end_with_progress(&mut buf, |transferred| {
                events.emit(Event::Progress(Progress {
                    filename: filename.clone(),
                    action: TransferAction::Get,
                    total: None,
                    transferred,
                }));
            })
            .await?;
        Ok(buf)
    }

    /// Download `remote` directly into the local file at `local`,
    /// reporting `progress` events as it streams.
    pub async fn get_to_file(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<(), Error> {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        socket.await_mark(&mut dispatcher, transfer_line("RETR", remote)).await?;
        drop(dispatcher);

        let mut file = File::create(local.as_ref()).await?;
        let filename = remote.to_string();
        let events = self.events.clone();
        socket
            .copy_to(&mut file, |transferred| {
                events.emit(Event::Progress(Progress {
                    filename: filename.clone(),
                    action: TransferAction::Get,
                    total: None,
                    transferred,
                }));
            })
            .await?;
        Ok(())
    }

    /// Upload `data` (an in-memory buffer) to `to`.
    pub async fn put(&mut self, to: &str, data: &[u8]) -> Result<(), Error> {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        socket.await_mark(&mut dispatcher, transfer_line("STOR", to)).await?;
        drop(dispatcher);

        socket.write_all_and_close(data).await?;
        self.events.emit(Event::Progress(Progress {
            filename: to.to_string(),
            action: TransferAction::Put,
            total: Some(data.len() as u64),
            transferred: data.len() as u64,
        }));
        Ok(())
    }

    /// Upload the local file at `local` to `to`. Fails with
    /// [`Error::Usage`] if the local path doesn't exist or is a
    /// directory (spec §4.5).
    pub async fn put_file(&mut self, to: &str, local: impl AsRef<Path>) -> Result<(), Error> {
        let local = local.as_ref();
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|_| Error::Usage("Local file doesn't exist.".to_string()))?;
        if metadata.is_dir() {
            return Err(Error::Usage("Local path cannot be a directory".to_string()));
        }
        let total = Some(metadata.len());

        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        socket.await_mark(&mut dispatcher, transfer_line("STOR", to)).await?;
        drop(dispatcher);

        let file = File::open(local).await?;
        let filename = to.to_string();
        let events = self.events.clone();
        socket
            .copy_from_and_close(file, |transferred| {
                events.emit(Event::Progress(Progress {
                    filename: filename.clone(),
                    action: TransferAction::Put,
                    total,
                    transferred,
                }));
            })
            .await?;
        Ok(())
    }

    /// Upload from an arbitrary async reader, such as a network stream.
    /// `total_hint` is optional metadata surfaced on `progress` events,
    /// mirroring the spec's note that a stream's size is not a standard
    /// attribute.
    pub async fn put_reader<R>(
        &mut self,
        to: &str,
        reader: R,
        total_hint: Option<u64>,
    ) -> Result<u64, Error>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut socket = PassiveSocket::open(&mut dispatcher, self.config.timeout, self.events.clone()).await?;
        socket.await_mark(&mut dispatcher, transfer_line("STOR", to)).await?;
        drop(dispatcher);

        let filename = to.to_string();
        let events = self.events.clone();
        socket
            .copy_from_and_close(reader, |transferred| {
                events.emit(Event::Progress(Progress {
                    filename: filename.clone(),
                    action: TransferAction::Put,
                    total: total_hint,
                    transferred,
                }));
            })
            .await
    }

    /// List `path` as structured entries, probing `STAT` first unless
    /// `use_list` is already set (spec §4.5).
    pub async fn ls(&mut self, path: &str) -> Result<Vec<FileEntry>, Error> {
        if self.use_list {
            let text = self.list(path).await?;
            return Ok(normalize_entries(parse_entries(&text)));
        }

        let hummingbird = self
            .dispatcher
            .lock()
            .await
            .auth_state()
            .system
            .as_deref()
            .map(|s| s.contains("hummingbird"))
            .unwrap_or(false);

        let stat_line = if path.is_empty() {
            "STAT".to_string()
        } else {
            format!("STAT {}", path)
        };
        let result = self.dispatcher.lock().await.execute(stat_line).await;
        match result {
            Ok(response) if !hummingbird => Ok(parse_entries(&response.text)),
            Ok(_) => {
                debug!("switching to LIST: server system string mentions hummingbird");
                self.use_list = true;
                let text = self.list(path).await?;
                Ok(normalize_entries(parse_entries(&text)))
            }
            Err(Error::Protocol { code, .. }) if code == 500 || code == 502 => {
                debug!("switching to LIST: STAT answered {}", code);
                self.use_list = true;
                let text = self.list(path).await?;
                Ok(normalize_entries(parse_entries(&text)))
            }
            Err(err) => Err(err),
        }
    }

    /// Rename `from` to `to` (`RNFR` then `RNTO`).
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let mut dispatcher = self.dispatcher.lock().await;
        dispatcher.execute(format!("RNFR {}", from)).await?;
        dispatcher.execute(format!("RNTO {}", to)).await?;
        Ok(())
    }

    /// Start (or restart) a recurring `NOOP` keep-alive, replacing any
    /// prior timer. Defaults to the session's configured `idle_time`
    /// (30 seconds unless overridden).
    pub fn keep_alive(&mut self, interval: Option<std::time::Duration>) {
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
        let interval = interval.unwrap_or(self.config.idle_time);
        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        self.keep_alive = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                let result = dispatcher.lock().await.execute("NOOP".to_string()).await;
                if let Err(err) = result {
                    warn!("keep-alive NOOP failed: {}", err);
                    events.emit(Event::Error(Arc::new(err)));
                }
            }
        }));
    }

    /// Stop the keep-alive timer, close the control and passive sockets,
    /// and reset cached feature/auth state (spec §4.5).
    pub async fn destroy(&mut self) {
        if let Some(handle) = self.keep_alive.take() {
            handle.abort();
        }
        self.dispatcher.lock().await.reset();
        self.type_ = None;
    }
}

fn transfer_line(cmd: &str, path: &str) -> String {
    if path.is_empty() {
        cmd.to_string()
    } else {
        format!("{} {}", cmd, path)
    }
}

fn normalize_entries(entries: Vec<FileEntry>) -> Vec<FileEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.name = nfc(&entry.name);
            entry
        })
        .collect()
}

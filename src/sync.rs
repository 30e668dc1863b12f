//! A blocking facade over [`crate::session::Session`], for callers that
//! don't want to bring their own `tokio` runtime. Each call blocks the
//! calling thread on a private runtime rather than requiring the caller
//! to be inside an async context.

use std::path::Path;

use tokio::runtime::Runtime;

use crate::config::SessionConfig;
use crate::entries::FileEntry;
use crate::error::Error;
use crate::events::EventReceiver;
use crate::response::Response;
use crate::session::Session;

/// Blocking wrapper around [`Session`].
pub struct Client {
    runtime: Runtime,
    session: Session,
}

impl Client {
    /// Connect, blocking until the control socket is up. See
    /// [`Session::connect`].
    pub fn connect(config: SessionConfig) -> Result<Self, Error> {
        let runtime = Runtime::new()?;
        let session = runtime.block_on(Session::connect(config))?;
        Ok(Client { runtime, session })
    }

    /// See [`Session::events`].
    pub fn events(&self) -> EventReceiver {
        self.session.events()
    }

    /// See [`Session::auth`].
    pub fn auth(&mut self) -> Result<(), Error> {
        self.runtime.block_on(self.session.auth())
    }

    /// See [`Session::has_feat`].
    pub fn has_feat(&mut self, feature: &str) -> bool {
        self.runtime.block_on(self.session.has_feat(feature))
    }

    /// See [`Session::raw`].
    pub fn raw(&mut self, cmd: &str, args: &[&str]) -> Result<Response, Error> {
        self.runtime.block_on(self.session.raw(cmd, args))
    }

    /// See [`Session::set_type`].
    pub fn set_type(&mut self, type_: char) -> Result<(), Error> {
        self.runtime.block_on(self.session.set_type(type_))
    }

    /// See [`Session::list`].
    pub fn list(&mut self, path: &str) -> Result<String, Error> {
        self.runtime.block_on(self.session.list(path))
    }

    /// See [`Session::ls`].
    pub fn ls(&mut self, path: &str) -> Result<Vec<FileEntry>, Error> {
        self.runtime.block_on(self.session.ls(path))
    }

    /// See [`Session::get`].
    pub fn get(&mut self, remote: &str) -> Result<Vec<u8>, Error> {
        self.runtime.block_on(self.session.get(remote))
    }

    /// See [`Session::get_to_file`].
    pub fn get_to_file(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<(), Error> {
        self.runtime.block_on(self.session.get_to_file(remote, local))
    }

    /// See [`Session::put`].
    pub fn put(&mut self, to: &str, data: &[u8]) -> Result<(), Error> {
        self.runtime.block_on(self.session.put(to, data))
    }

    /// See [`Session::put_file`].
    pub fn put_file(&mut self, to: &str, local: impl AsRef<Path>) -> Result<(), Error> {
        self.runtime.block_on(self.session.put_file(to, local))
    }

    /// See [`Session::rename`].
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        self.runtime.block_on(self.session.rename(from, to))
    }

    /// See [`Session::keep_alive`]. The timer itself still runs on the
    /// session's own background task, not the calling thread.
    pub fn keep_alive(&mut self, interval: Option<std::time::Duration>) {
        let _guard = self.runtime.enter();
        self.session.keep_alive(interval);
    }

    /// See [`Session::destroy`].
    pub fn destroy(&mut self) {
        self.runtime.block_on(self.session.destroy())
    }
}

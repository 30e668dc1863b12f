//! An async FTP client built on `tokio`.
//!
//! A [`Session`] owns one control connection and serializes command
//! execution over it; data transfers (`LIST`/`RETR`/`STOR`) open a
//! short-lived passive data connection alongside it. The implicit auth
//! chain (`FEAT`/`SYST`/`USER`/`PASS`/`TYPE I`) runs automatically
//! before the first command that needs it.
//!
//! ```rust,no_run
//! use ftp_client::prelude::*;
//!
//! # async fn run() -> Result<(), Error> {
//! let config = SessionConfigBuilder::new("test.rebex.net")
//!     .credentials("demo", "password")
//!     .build();
//! let mut session = Session::connect(config).await?;
//! let names = session.list("/").await?;
//! println!("{}", names);
//! # Ok(())
//! # }
//! ```
//!
//! [`sync::Client`] wraps the same [`Session`] behind a blocking API for
//! callers that don't want to pull in an async runtime themselves.

#![deny(missing_docs)]

mod command;
pub mod config;
mod control;
mod dispatcher;
pub mod entries;
pub mod error;
pub mod events;
pub mod nfc;
mod passive;
pub mod response;
pub mod session;
pub mod sync;

/// Common imports for using this crate.
pub mod prelude {
    pub use crate::config::{SessionConfig, SessionConfigBuilder};
    pub use crate::error::Error;
    pub use crate::events::{Event, EventReceiver, Progress, TransferAction};
    pub use crate::session::Session;
}

//! Passive-mode data connection lifecycle (spec §4.4): parse the PASV
//! reply, open the data socket, pair it with a transfer command's mark,
//! and apply the idle timeout.

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::command::ExpectMark;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::events::{Event, EventBus};

static PASV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([-\d]+,[-\d]+,[-\d]+,[-\d]+),([-\d]+),([-\d]+)").unwrap());

const READ_CHUNK: usize = 64 * 1024;

/// A passive data socket, paired with a transfer command and wrapped with
/// the session's idle timeout.
pub(crate) struct PassiveSocket {
    stream: TcpStream,
    idle_timeout: Duration,
    events: EventBus,
}

impl PassiveSocket {
    /// Issue `PASV`, parse the reply, and connect to the advertised
    /// endpoint.
    pub async fn open(
        dispatcher: &mut Dispatcher,
        idle_timeout: Duration,
        events: EventBus,
    ) -> Result<Self, Error> {
        let response = dispatcher.execute("PASV".to_string()).await?;
        let (host, port) = parse_pasv_reply(&response.text)?;
        trace!("passive endpoint {}:{}", host, port);
        let stream = TcpStream::connect((host.as_str(), port)).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::ConnectionRefused {
                Error::Io(std::io::Error::new(
                    err.kind(),
                    "connection refused opening passive data socket \
                     (probably trying a PASV operation while one is in progress)",
                ))
            } else {
                Error::Io(err)
            }
        })?;
        Ok(PassiveSocket {
            stream,
            idle_timeout,
            events,
        })
    }

    /// Issue the transfer command (`RETR path`, `STOR path`, `LIST
    /// [path]`, ...) expecting a mark, and return once it arrives. The
    /// socket is now ready for the caller to drive.
    pub async fn await_mark(
        &self,
        dispatcher: &mut Dispatcher,
        line: impl Into<String>,
    ) -> Result<(), Error> {
        dispatcher
            .execute_transfer(line, ExpectMark::transfer())
            .await?;
        Ok(())
    }

    /// Read the whole data stream into `buf`, honoring the idle timeout
    /// between reads.
    pub async fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        self.read_to_end_with_progress(buf, |_| {}).await
    }

    /// As [`PassiveSocket::read_to_end`], invoking `on_progress` with the
    /// running byte total after each chunk.
    pub async fn read_to_end_with_progress(
        &mut self,
        buf: &mut Vec<u8>,
        mut on_progress: impl FnMut(u64),
    ) -> Result<(), Error> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let read = timeout(self.idle_timeout, self.stream.read(&mut chunk)).await;
            let n = match read {
                Ok(result) => result?,
                Err(_) => return Err(self.fail_timeout().await),
            };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            total += n as u64;
            on_progress(total);
        }
        Ok(())
    }

    /// Write `data` and then half-close the socket, as `STOR` with an
    /// in-memory buffer does.
    pub async fn write_all_and_close(&mut self, data: &[u8]) -> Result<(), Error> {
        match timeout(self.idle_timeout, self.stream.write_all(data)).await {
            Ok(result) => result?,
            Err(_) => return Err(self.fail_timeout().await),
        }
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Copy from an async reader into the socket, invoking `on_progress`
    /// after each chunk, then half-close.
    pub async fn copy_from_and_close<R>(
        &mut self,
        mut reader: R,
        mut on_progress: impl FnMut(u64),
    ) -> Result<u64, Error>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            match timeout(self.idle_timeout, self.stream.write_all(&chunk[..n])).await {
                Ok(result) => result?,
                Err(_) => return Err(self.fail_timeout().await),
            }
            total += n as u64;
            on_progress(total);
        }
        self.stream.shutdown().await?;
        Ok(total)
    }

    /// Copy the full data stream out to an async writer, invoking
    /// `on_progress` after each chunk.
    pub async fn copy_to(
        &mut self,
        mut writer: impl tokio::io::AsyncWrite + Unpin,
        mut on_progress: impl FnMut(u64),
    ) -> Result<u64, Error> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0u64;
        loop {
            let read = timeout(self.idle_timeout, self.stream.read(&mut chunk)).await;
            let n = match read {
                Ok(result) => result?,
                Err(_) => return Err(self.fail_timeout().await),
            };
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
            total += n as u64;
            on_progress(total);
        }
        Ok(total)
    }

    async fn fail_timeout(&mut self) -> Error {
        warn!("passive data socket idle timeout");
        let _ = self.stream.shutdown().await;
        self.events.emit(Event::Timeout);
        Error::Timeout("Passive socket timeout".to_string())
    }
}

impl Drop for PassiveSocket {
    fn drop(&mut self) {
        debug!("passive data socket closed");
    }
}

/// Parse a PASV reply's text for the host/port it advertises (spec
/// §4.4). Octets may be negative (some servers echo signed bytes); the
/// port's two components are masked to `& 255` before being combined.
fn parse_pasv_reply(text: &str) -> Result<(String, u16), Error> {
    let captures = PASV_RE
        .captures(text)
        .ok_or_else(|| Error::Parse("Bad passive host/port combination".to_string()))?;
    let host = captures[1].replace(',', ".");
    let p1: i32 = captures[2]
        .parse()
        .map_err(|_| Error::Parse("Bad passive host/port combination".to_string()))?;
    let p2: i32 = captures[3]
        .parse()
        .map_err(|_| Error::Parse("Bad passive host/port combination".to_string()))?;
    let port = ((p1 & 255) * 256 + (p2 & 255)) as u16;
    Ok((host, port))
}

//! Owns the TCP connection to the FTP server's control port.
//!
//! The original design fuses a socket and a parser into one "duplexer"
//! object exposing both sides' events. Per spec §9 this is split into two
//! explicit halves instead: a [`Framed`] stream/sink pair that this type
//! wraps, exposing `send` for writes and `recv` for the next parsed
//! [`Response`].

use futures::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::Error;
use crate::events::{Event, EventBus};
use crate::response::{Response, ResponseParser};

/// The control connection: a framed TCP stream plus the session's event
/// bus, so reconnecting can fire a `connect` event.
pub(crate) struct ControlChannel {
    host: String,
    port: u16,
    framed: Option<Framed<TcpStream, ResponseParser>>,
    events: EventBus,
}

impl ControlChannel {
    /// Open a control connection to `host:port` right away, mirroring the
    /// spec's "a Session eagerly opens the control socket" lifecycle rule.
    pub async fn connect(host: String, port: u16, events: EventBus) -> Result<Self, Error> {
        let mut channel = ControlChannel {
            host,
            port,
            framed: None,
            events,
        };
        channel.reconnect().await?;
        Ok(channel)
    }

    /// True once a socket has been established.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Tear down any existing socket/parser and open a new one,
    /// discarding whatever partial reply the old parser had buffered.
    /// Fires [`Event::Connect`] once the new socket is up.
    pub async fn reconnect(&mut self) -> Result<(), Error> {
        self.framed = None;
        let addr = format!("{}:{}", self.host, self.port);
        trace!("control channel connecting to {}", addr);
        let stream = TcpStream::connect(&addr).await?;
        self.framed = Some(Framed::new(stream, ResponseParser::new()));
        self.events.emit(Event::Connect);
        debug!("control channel connected to {}", addr);
        Ok(())
    }

    /// Ensure a socket exists, opening one if this is the first send or a
    /// previous connection was dropped.
    pub async fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.framed.is_none() {
            self.reconnect().await?;
        }
        Ok(())
    }

    /// Write `line + "\r\n"`. A no-op for an empty line.
    pub async fn send(&mut self, line: &str) -> Result<(), Error> {
        self.ensure_connected().await?;
        trace!("-> {}", line);
        let framed = self.framed.as_mut().expect("ensure_connected");
        framed.send(line).await
    }

    /// Await the next parsed response, or `None` if the socket closed.
    /// A transport error both returns here and is emitted on the event
    /// bus, per spec §7's dual propagation rule.
    pub async fn recv(&mut self) -> Option<Result<Response, Error>> {
        let framed = self.framed.as_mut()?;
        match framed.next().await {
            Some(Ok(response)) => {
                trace!("<- {} {}", response.code, response.text);
                self.events.emit(Event::Data(response.clone()));
                Some(Ok(response))
            }
            Some(Err(err)) => {
                let shared = std::sync::Arc::new(err);
                self.events.emit(Event::Error(shared.clone()));
                self.framed = None;
                Some(Err(Error::Parse(shared.to_string())))
            }
            None => {
                self.framed = None;
                None
            }
        }
    }

    /// Close the socket. Idempotent.
    pub fn close(&mut self) {
        self.framed = None;
    }
}

//! End-to-end scenarios against an in-process mock FTP server: the
//! implicit auth chain, a transfer's suppressed terminal reply, and the
//! `STAT`/`LIST` fallback in `ls`.

use std::time::Duration;

use ftp_client::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

struct MockServer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockServer {
    async fn accept(listener: TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, writer) = stream.into_split();
        MockServer {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn expect(&mut self, line: &str) {
        let mut buf = String::new();
        self.reader.read_line(&mut buf).await.unwrap();
        assert_eq!(buf.trim_end(), line);
    }

    async fn reply(&mut self, text: &[u8]) {
        self.writer.write_all(text).await.unwrap();
    }

    async fn run_auth_chain(&mut self) {
        self.expect("FEAT").await;
        self.reply(b"211-Features:\r\n UTF8\r\n EPSV\r\n211 End\r\n").await;
        self.expect("SYST").await;
        self.reply(b"215 UNIX Type: L8\r\n").await;
        self.expect("USER anonymous").await;
        self.reply(b"331 need pass\r\n").await;
        self.expect("PASS @anonymous").await;
        self.reply(b"230 ok\r\n").await;
        self.expect("TYPE I").await;
        self.reply(b"200 type set\r\n").await;
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config(port: u16) -> SessionConfig {
    SessionConfigBuilder::new("127.0.0.1")
        .port(port)
        .timeout(Duration::from_secs(5))
        .build()
}

fn pasv_reply(data_port: u16) -> Vec<u8> {
    let hi = (data_port >> 8) as u8;
    let lo = (data_port & 0xff) as u8;
    format!("227 Entering Passive Mode (127,0,0,1,{},{})\r\n", hi, lo).into_bytes()
}

#[tokio::test]
async fn auth_chain_runs_once_before_first_command() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(listener).await;
        server.reply(b"220 ready\r\n").await;
        server.run_auth_chain().await;
        server.expect("PWD").await;
        server.reply(b"257 \"/\" is current directory\r\n").await;
        server.expect("PWD").await;
        server.reply(b"257 \"/\" is current directory\r\n").await;
    });

    let mut session = Session::connect(config(port)).await.unwrap();
    let first = session.raw("PWD", &[]).await.unwrap();
    let second = session.raw("PWD", &[]).await.unwrap();
    assert_eq!(first.code, 257);
    assert_eq!(second.code, 257);
    assert!(session.has_feat("utf8").await);
    assert!(session.has_feat("epsv").await);

    server.await.unwrap();
}

#[tokio::test]
async fn put_does_not_deliver_suppressed_terminal_to_caller() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(listener).await;
        server.reply(b"220 ready\r\n").await;
        server.run_auth_chain().await;

        server.expect("PASV").await;
        let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data_listener.local_addr().unwrap().port();
        server.reply(&pasv_reply(data_port)).await;

        server.expect("STOR /tmp/a").await;
        server.reply(b"150 ok\r\n").await;

        let (mut data, _) = data_listener.accept().await.unwrap();
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");

        // Sent after the data socket already closed; must never reach
        // the caller's `put` result.
        server.reply(b"226 done\r\n").await;
    });

    let mut session = Session::connect(config(port)).await.unwrap();
    session.put("/tmp/a", b"hello").await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn ls_falls_back_to_list_when_stat_unsupported() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(listener).await;
        server.reply(b"220 ready\r\n").await;
        server.run_auth_chain().await;

        server.expect("STAT /x").await;
        server.reply(b"500 unknown command\r\n").await;

        server.expect("PASV").await;
        let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data_listener.local_addr().unwrap().port();
        server.reply(&pasv_reply(data_port)).await;

        server.expect("LIST /x").await;
        server.reply(b"150 opening data connection\r\n").await;

        let (mut data, _) = data_listener.accept().await.unwrap();
        // "cafe" followed by a combining acute accent: nfc() must fold
        // this to the precomposed form.
        data.write_all(b"-rw-r--r-- 1 demo demo 5 Jan 01 2020 cafe\xcc\x81.txt\r\n")
            .await
            .unwrap();
        data.shutdown().await.unwrap();

        server.reply(b"226 done\r\n").await;
    });

    let mut session = Session::connect(config(port)).await.unwrap();
    let entries = session.ls("/x").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "café.txt");
    assert_eq!(entries[0].size, Some(5));

    server.await.unwrap();
}

#[tokio::test]
async fn passive_socket_idle_timeout_fails_the_transfer_and_emits_event() {
    let (listener, port) = bind().await;

    let config = SessionConfigBuilder::new("127.0.0.1")
        .port(port)
        .timeout(Duration::from_millis(100))
        .build();

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(listener).await;
        server.reply(b"220 ready\r\n").await;
        server.run_auth_chain().await;

        server.expect("PASV").await;
        let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data_listener.local_addr().unwrap().port();
        server.reply(&pasv_reply(data_port)).await;

        server.expect("RETR /slow").await;
        server.reply(b"150 opening data connection\r\n").await;

        // Accept the data connection and then sit on it, past the
        // client's idle timeout, without writing or closing.
        let (_data, _) = data_listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut session = Session::connect(config).await.unwrap();
    let mut events = session.events();

    let err = session.get("/slow").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    let mut saw_timeout = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::Timeout) {
            saw_timeout = true;
        }
    }
    assert!(saw_timeout, "expected a Timeout event on the session bus");

    server.abort();
}

#[tokio::test]
async fn protocol_error_is_scoped_to_the_failing_command() {
    let (listener, port) = bind().await;

    let server = tokio::spawn(async move {
        let mut server = MockServer::accept(listener).await;
        server.reply(b"220 ready\r\n").await;
        server.run_auth_chain().await;
        server.expect("CWD /nope").await;
        server.reply(b"550 No such directory\r\n").await;
    });

    let mut session = Session::connect(config(port)).await.unwrap();
    let err = session.raw("CWD", &["/nope"]).await.unwrap_err();
    assert!(err.is_protocol());

    server.await.unwrap();
}

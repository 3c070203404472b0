//! TLS socket I/O for the IRC-over-TLS wire (spec §4.E, §6).
//!
//! Grounded on `other_examples/…jprochazk-tmi-rs__src-conn.rs.rs`'s
//! `connect_tls`/`Reader`/`Sender` split: one logical reader owned by the
//! Reader task, one logical writer serialized by a mutex and shared with
//! the Sender task so PONG replies and outbound PRIVMSGs never interleave.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use super::codec::{self, WireMessage};

const TWITCH_HOST: &str = "irc.chat.twitch.tv";
const TWITCH_PORT: u16 = 6697;

type Writer = Arc<Mutex<WriteHalf<TlsStream<TcpStream>>>>;

/// Owns the read half; parses lines and answers `PING` inline without
/// surfacing it.
pub struct IrcReader {
    lines: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: Writer,
}

impl IrcReader {
    /// Returns `Ok(None)` on clean EOF (connection closed by peer).
    pub async fn next_message(&mut self) -> io::Result<Option<WireMessage>> {
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self.lines.read_line(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            let line = buf.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            let message = codec::parse_line(line);
            if message.command == "PING" {
                let payload = message
                    .trailing
                    .as_deref()
                    .or_else(|| message.params.first().map(String::as_str))
                    .unwrap_or("");
                write_line(&self.writer, &codec::format_pong(payload)).await?;
                continue;
            }

            return Ok(Some(message));
        }
    }
}

/// Owns (a shared handle to) the write half. Every method serializes under
/// the same write lock as [`IrcReader`]'s PONG replies.
#[derive(Clone)]
pub struct IrcSender {
    writer: Writer,
}

impl IrcSender {
    pub async fn pass(&self, credential: &str) -> io::Result<()> {
        write_line(&self.writer, &codec::format_pass(credential)).await
    }

    pub async fn nick(&self, nick: &str) -> io::Result<()> {
        write_line(&self.writer, &codec::format_nick(nick)).await
    }

    pub async fn cap_req(&self) -> io::Result<()> {
        write_line(&self.writer, &codec::format_cap_req()).await
    }

    pub async fn join(&self, channel: &str) -> io::Result<()> {
        write_line(&self.writer, &codec::format_join(channel)).await
    }

    pub async fn privmsg(
        &self,
        channel: &str,
        text: &str,
        reply_parent_msg_id: Option<&str>,
    ) -> io::Result<()> {
        write_line(
            &self.writer,
            &codec::format_privmsg(channel, text, reply_parent_msg_id),
        )
        .await
    }
}

async fn write_line(writer: &Writer, line: &str) -> io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Connect over TLS, authenticate, request capabilities, and join every
/// channel in `channels`. Returns the split reader/sender pair; callers run
/// them as two cooperating tasks per spec §4.E.
pub async fn connect(nick: &str, pass: &str, channels: &[String]) -> io::Result<(IrcReader, IrcSender)> {
    let root_store = build_root_store()?;
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect((TWITCH_HOST, TWITCH_PORT)).await?;
    let server_name = rustls::pki_types::ServerName::try_from(TWITCH_HOST)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let tls = connector.connect(server_name, tcp).await?;

    let (read_half, write_half) = tokio::io::split(tls);
    let writer: Writer = Arc::new(Mutex::new(write_half));

    let reader = IrcReader {
        lines: BufReader::new(read_half),
        writer: writer.clone(),
    };
    let sender = IrcSender { writer };

    sender.pass(pass).await?;
    sender.nick(nick).await?;
    sender.cap_req().await?;
    for channel in channels {
        sender.join(channel).await?;
    }

    Ok((reader, sender))
}

fn build_root_store() -> io::Result<rustls::RootCertStore> {
    let mut store = rustls::RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "failed to load a native certificate");
    }

    let mut added = 0usize;
    for cert in loaded.certs {
        if store.add(cert).is_ok() {
            added += 1;
        }
    }

    if added == 0 {
        return Err(io::Error::other("no trusted root certificates available"));
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_root_store_finds_system_trust_anchors() {
        // Exercises the native-cert loading path; environments without a
        // system trust store would legitimately fail here.
        let result = build_root_store();
        assert!(result.is_ok());
    }
}

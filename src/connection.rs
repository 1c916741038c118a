//! Connection management for the controller channel.
//!
//! One [`Connection`] wraps one outbound TCP socket. Right after the
//! socket opens, the local hostname goes out as a bare, unframed
//! identification payload; every byte after that handshake travels as
//! an encrypted frame (see [`crate::framing`] and [`crate::crypto`]).
//!
//! Reads use a short timeout so the receive loop can notice the
//! process-wide shutdown flag while blocked; reconnect sleeps poll the
//! same flag. A peer close is reported as `Ok(None)` from
//! [`Connection::receive`], never as an error; callers pattern-match
//! instead of catching, and only genuine I/O or integrity failures
//! arrive as `Err`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::constants::{CONNECT_TIMEOUT, READ_POLL_INTERVAL, SHUTDOWN_POLL_INTERVAL};
use crate::crypto::ChannelCipher;
use crate::framing::{encode_frame, FrameDecoder};

/// Framed, encrypted send/receive over the controller channel.
///
/// Command handlers take `&mut dyn Channel` rather than the concrete
/// [`Connection`] so they stay testable without sockets; `transfer put`
/// is the one built-in that reads mid-command.
pub trait Channel {
    /// Encrypt and frame a plaintext payload, then write it out.
    fn send(&mut self, plaintext: &[u8]) -> Result<()>;

    /// Read the next frame and decrypt it.
    ///
    /// `Ok(None)` means the peer closed the connection (including a
    /// close partway through a frame - a short read is a connection
    /// failure, never a shorter message).
    fn receive(&mut self) -> Result<Option<Vec<u8>>>;
}

/// One live connection to the controller.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    decoder: FrameDecoder,
    cipher: Arc<ChannelCipher>,
    shutdown: Arc<AtomicBool>,
    peer: String,
}

impl Connection {
    /// Make a single connect attempt and perform the hostname handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution, connect, socket setup, or the
    /// handshake write fails. Callers that want the unbounded retry
    /// policy use [`Connection::connect_with_retry`].
    pub fn connect(
        host: &str,
        port: u16,
        cipher: Arc<ChannelCipher>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let addr = resolve(host, port)?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .with_context(|| format!("could not connect to {peer}"))?;
        stream
            .set_read_timeout(Some(READ_POLL_INTERVAL))
            .context("could not set read timeout")?;

        let mut connection = Self {
            stream,
            decoder: FrameDecoder::new(),
            cipher,
            shutdown,
            peer,
        };
        connection.announce()?;
        Ok(connection)
    }

    /// Keep attempting to connect until success or shutdown.
    ///
    /// Fixed sleep between attempts, no attempt ceiling: the client is
    /// expected to wait out controller downtime indefinitely. Returns
    /// `None` only when the shutdown flag interrupts the loop.
    pub fn connect_with_retry(
        host: &str,
        port: u16,
        retry_interval: Duration,
        cipher: &Arc<ChannelCipher>,
        shutdown: &Arc<AtomicBool>,
    ) -> Option<Self> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return None;
            }
            match Self::connect(host, port, Arc::clone(cipher), Arc::clone(shutdown)) {
                Ok(connection) => return Some(connection),
                Err(e) => {
                    log::warn!(
                        "connect failed: {e:#}; retrying in {}s",
                        retry_interval.as_secs()
                    );
                    if !sleep_interruptible(retry_interval, shutdown) {
                        return None;
                    }
                }
            }
        }
    }

    /// Send the plaintext hostname announcement.
    ///
    /// This is the only unframed, unencrypted traffic on the channel.
    fn announce(&mut self) -> Result<()> {
        let name = hostname::get()
            .context("could not read local hostname")?
            .to_string_lossy()
            .into_owned();
        self.stream
            .write_all(name.as_bytes())
            .context("could not send handshake")?;
        log::info!("connected to {} as {name}", self.peer);
        Ok(())
    }

    /// Encrypt, frame, and write one message.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        let token = self.cipher.encrypt(plaintext);
        let frame = encode_frame(token.as_bytes())?;
        self.stream
            .write_all(&frame)
            .with_context(|| format!("could not send frame to {}", self.peer))?;
        Ok(())
    }

    /// Read and decrypt the next message.
    ///
    /// Blocks until a full frame arrives, the peer closes (`Ok(None)`),
    /// the shutdown flag is raised, or an I/O or integrity error occurs.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                let token =
                    std::str::from_utf8(&frame).context("frame payload is not a valid token")?;
                let plaintext = self.cipher.decrypt(token)?;
                return Ok(Some(plaintext));
            }

            if self.shutdown.load(Ordering::SeqCst) {
                bail!("shutdown requested");
            }

            match self.stream.read(&mut buf) {
                Ok(0) => {
                    if self.decoder.has_partial() {
                        log::warn!("{} closed mid-frame; discarding partial data", self.peer);
                    }
                    return Ok(None);
                }
                Ok(n) => self.decoder.feed(&buf[..n]),
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    // Read timeout tick; loop back to check the flag.
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("read from {} failed", self.peer))
                }
            }
        }
    }

    /// Orderly shutdown of the socket.
    ///
    /// Close errors are logged and swallowed; teardown proceeds
    /// regardless of socket state.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("socket close for {}: {e}", self.peer);
        }
    }

    /// `host:port` label of the controller, for logs and tests.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Channel for Connection {
    fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        Connection::send(self, plaintext)
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        Connection::receive(self)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("could not resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("no addresses for {host}:{port}"))
}

/// Sleep in small increments, waking early if the flag is raised.
///
/// Returns false when interrupted by shutdown.
fn sleep_interruptible(total: Duration, shutdown: &Arc<AtomicBool>) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SHUTDOWN_POLL_INTERVAL.min(deadline - now));
    }
}

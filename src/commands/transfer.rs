//! File movement over the encrypted channel.
//!
//! Both directions move the whole file as a single frame; there is no
//! chunking and no size negotiation. `put` is the only built-in that
//! reads from the channel mid-command, which is why handlers get a
//! [`Channel`] at all.

use std::fs;

use anyhow::{bail, Result};

use crate::commands::Reply;
use crate::connection::Channel;

/// `transfer get <path>`: read a local file into one reply.
///
/// An unreadable path becomes a textual reply so the operator sees the
/// failure inline instead of losing the session.
#[must_use]
pub fn send_file(path: &str) -> Reply {
    match fs::read(path) {
        Ok(contents) => Reply::Data(contents),
        Err(e) => Reply::text(format!("error retrieving file: {e}\n")),
    }
}

/// `transfer put <path>`: receive one payload frame and write it out.
///
/// The controller sends the file contents as the next message on the
/// channel. A failed write is an ordinary textual reply; success acks
/// with `done`.
///
/// # Errors
///
/// Returns an error if the channel closes or fails before the payload
/// frame arrives, since there is nothing sensible to write.
pub fn receive_file(channel: &mut dyn Channel, path: &str) -> Result<Reply> {
    let Some(contents) = channel.receive()? else {
        bail!("connection closed before the file payload arrived");
    };
    match fs::write(path, contents) {
        Ok(()) => Ok(Reply::text("done")),
        Err(e) => Ok(Reply::text(format!("error saving file: {e}\n"))),
    }
}

//! Shellback - reverse shell client library.
//!
//! This crate implements the client half of a command-execution
//! channel for authorized remote administration: the client dials out
//! to a controller, identifies itself by hostname, and then serves a
//! request/reply session in which every message is an encrypted token
//! inside a length-prefixed frame.
//!
//! # Architecture
//!
//! Layers, bottom up:
//!
//! - **Framing** - length-prefixed frames over the byte stream
//! - **Crypto** - authenticated encryption of frame payloads
//! - **Connection** - one outbound socket, handshake, framed send/receive
//! - **Commands** - built-in dispatch with a shell fallback
//! - **Client** - session loop with unbounded reconnect
//!
//! # Modules
//!
//! - [`client`] - session loop and reconnect policy
//! - [`commands`] - built-in command registry, shell and transfer handlers
//! - [`config`] - configuration loading/saving with env overrides
//! - [`connection`] - outbound TCP connection and the [`Channel`] seam
//! - [`crypto`] - token encryption around the channel key
//! - [`framing`] - incremental frame encoder/decoder

// Library modules
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod constants;
pub mod crypto;
pub mod framing;

// Re-export commonly used types
pub use client::{Client, SessionEnd};
pub use commands::{CommandRegistry, Reply};
pub use config::Config;
pub use connection::{Channel, Connection};
pub use crypto::ChannelCipher;
pub use framing::FrameDecoder;

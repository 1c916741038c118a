//! Application-wide constants for shellback.
//!
//! This module centralizes magic numbers and protocol defaults to keep
//! them discoverable. Constants are grouped by domain with documentation
//! explaining their purpose.

use std::time::Duration;

// ============================================================================
// Protocol defaults
// ============================================================================

/// Default controller host to call back to.
///
/// A placeholder: deployments set the real controller address via the
/// config file, `SHELLBACK_HOST`, or `-H`.
pub const DEFAULT_CONTROLLER_HOST: &str = "0.0.0.0";

/// Default controller port.
pub const DEFAULT_CONTROLLER_PORT: u16 = 8880;

/// Default pre-shared channel key (32 bytes, url-safe base64).
///
/// Must match the key the controller uses. Real deployments replace it
/// via the config file or `SHELLBACK_KEY`; `shellback keygen` produces
/// a fresh one.
pub const DEFAULT_CHANNEL_KEY: &str = "secretsecretsecretwbsecretsecretsecretsecre=";

// ============================================================================
// Timeouts & polling
// ============================================================================

/// Default seconds to sleep between reconnect attempts.
///
/// The retry policy is a fixed interval with unbounded attempts: the
/// client is a long-lived background process and keeps trying until the
/// controller becomes reachable. No exponential backoff, no jitter.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Upper bound on a single TCP connect attempt.
///
/// Without this, a filtered network can park `connect` for minutes and
/// the retry loop stops responding to shutdown signals.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout on the connected socket.
///
/// Blocking reads wake at this interval so the receive loop can check
/// the shutdown flag between reads. Large enough to stay off the hot
/// path, small enough that signal response feels immediate.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Granularity of interruptible sleeps (reconnect backoff).
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

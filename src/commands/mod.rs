//! Built-in command dispatch for controller requests.
//!
//! Every request line is matched against a static registry of built-in
//! commands by its first whitespace-separated token; anything that does
//! not match falls through to the system shell (see [`shell`]). Built-ins
//! therefore shadow same-named shell programs.
//!
//! Handlers never tear down the session: expected failures (a bad `cd`
//! target, a missing transfer file) come back as textual replies for the
//! operator, and only transport-level problems surface as errors.
//!
//! - [`shell`] - fallback execution through the system shell
//! - [`transfer`] - file upload/download over the channel

pub mod shell;
pub mod transfer;

use std::collections::HashMap;
use std::env;

use anyhow::Result;

use crate::connection::Channel;

const TRANSFER_USAGE: &str = "usage: transfer <get|put> <path>\n";

/// Outcome of handling one request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Payload to send back to the controller. May be empty, which the
    /// controller reads as success-with-no-output.
    Data(Vec<u8>),
    /// Close the connection but keep the client process alive so it
    /// reconnects after the usual retry interval.
    Background,
}

impl Reply {
    /// A plain-text data reply.
    #[must_use]
    pub fn text(message: impl Into<String>) -> Self {
        Reply::Data(message.into().into_bytes())
    }
}

/// One entry in the built-in table.
#[derive(Debug)]
struct Builtin {
    name: &'static str,
    description: &'static str,
    run: fn(&mut dyn Channel, &str) -> Result<Reply>,
}

/// Declaration order is the order `help` lists commands in.
static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "cd",
        description: "change the working directory",
        run: cd,
    },
    Builtin {
        name: "hello",
        description: "reply with a greeting",
        run: hello,
    },
    Builtin {
        name: "background",
        description: "close the connection and keep the client alive",
        run: background,
    },
    Builtin {
        name: "help",
        description: "list the built-in commands",
        run: help,
    },
    Builtin {
        name: "transfer",
        description: "move a file over the channel (get|put <path>)",
        run: transfer,
    },
];

/// Lookup table from command name to handler.
#[derive(Debug)]
pub struct CommandRegistry {
    table: HashMap<&'static str, &'static Builtin>,
}

impl CommandRegistry {
    /// Build the table from the static built-in list.
    #[must_use]
    pub fn new() -> Self {
        let table = BUILTINS.iter().map(|builtin| (builtin.name, builtin)).collect();
        Self { table }
    }

    /// Route one request line to its handler.
    ///
    /// The first whitespace-separated token selects a built-in; a miss
    /// hands the whole line to the shell. The handler receives the full
    /// line and does its own argument parsing.
    ///
    /// # Errors
    ///
    /// Only transport failures inside a handler (`transfer put` reading
    /// the file payload) propagate; command-level failures are replies.
    pub fn dispatch(&self, channel: &mut dyn Channel, line: &str) -> Result<Reply> {
        let head = line.split_whitespace().next().unwrap_or("");
        match self.table.get(head) {
            Some(builtin) => (builtin.run)(channel, line),
            None => Ok(Reply::Data(shell::run(line).into_bytes())),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `cd <path>`: change the process working directory.
///
/// Success is the empty reply. Failure reports the shell-style message
/// and leaves the working directory untouched.
fn cd(_channel: &mut dyn Channel, line: &str) -> Result<Reply> {
    let path = line.trim_start().strip_prefix("cd").unwrap_or("").trim();
    match env::set_current_dir(path) {
        Ok(()) => Ok(Reply::Data(Vec::new())),
        Err(_) => Ok(Reply::text(format!(
            "cd: {path}: No such file or directory\n"
        ))),
    }
}

/// `hello`: liveness probe. Arguments are ignored.
fn hello(_channel: &mut dyn Channel, _line: &str) -> Result<Reply> {
    Ok(Reply::text("hello"))
}

/// `background`: detach from the controller without exiting.
fn background(_channel: &mut dyn Channel, _line: &str) -> Result<Reply> {
    Ok(Reply::Background)
}

/// `help`: one `name: description` line per built-in.
fn help(_channel: &mut dyn Channel, _line: &str) -> Result<Reply> {
    let listing = BUILTINS
        .iter()
        .map(|builtin| format!("{}: {}", builtin.name, builtin.description))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Reply::text(listing))
}

/// `transfer <get|put> <path>`: file movement over the channel.
fn transfer(channel: &mut dyn Channel, line: &str) -> Result<Reply> {
    let mut words = line.split_whitespace();
    let _ = words.next(); // the literal "transfer"
    match (words.next(), words.next()) {
        (Some("get"), Some(path)) => Ok(transfer::send_file(path)),
        (Some("put"), Some(path)) => transfer::receive_file(channel, path),
        _ => Ok(Reply::text(TRANSFER_USAGE)),
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use anyhow::Result;

    use crate::connection::Channel;

    /// In-memory channel for exercising handlers without a socket.
    #[derive(Debug, Default)]
    pub(crate) struct MockChannel {
        /// Queued results for `receive`, oldest first. An exhausted
        /// queue reads as a closed connection.
        pub(crate) incoming: VecDeque<Option<Vec<u8>>>,
        /// Everything the handler sent, in order.
        pub(crate) sent: Vec<Vec<u8>>,
    }

    impl Channel for MockChannel {
        fn send(&mut self, plaintext: &[u8]) -> Result<()> {
            self.sent.push(plaintext.to_vec());
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.incoming.pop_front().unwrap_or(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChannel;
    use super::*;
    use std::sync::Mutex;

    // set_current_dir is process-global; cd tests serialize on this.
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn dispatch(line: &str) -> Reply {
        let registry = CommandRegistry::new();
        let mut channel = MockChannel::default();
        registry.dispatch(&mut channel, line).unwrap()
    }

    #[test]
    fn test_registration_order() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(names, ["cd", "hello", "background", "help", "transfer"]);
    }

    #[test]
    fn test_builtin_shadows_shell() {
        // A shell would fail on `hello`; the built-in must win.
        assert_eq!(dispatch("hello"), Reply::text("hello"));
    }

    #[test]
    fn test_hello_ignores_arguments() {
        assert_eq!(dispatch("hello there general"), Reply::text("hello"));
    }

    #[test]
    fn test_unknown_command_falls_through_to_shell() {
        let Reply::Data(output) = dispatch("echo shellback") else {
            panic!("expected a data reply");
        };
        assert_eq!(String::from_utf8_lossy(&output), "shellback\n");
    }

    #[test]
    fn test_background_requests_detach() {
        assert_eq!(dispatch("background"), Reply::Background);
    }

    #[test]
    fn test_cd_success_is_empty_reply() {
        let _guard = CWD_LOCK.lock().unwrap();
        let original = env::current_dir().unwrap();
        let target = tempfile::tempdir().unwrap();

        let reply = dispatch(&format!("cd {}", target.path().display()));
        assert_eq!(reply, Reply::Data(Vec::new()));
        assert_eq!(
            env::current_dir().unwrap(),
            target.path().canonicalize().unwrap()
        );

        env::set_current_dir(original).unwrap();
    }

    #[test]
    fn test_cd_missing_path_reports_error_and_keeps_cwd() {
        let _guard = CWD_LOCK.lock().unwrap();
        let original = env::current_dir().unwrap();

        let reply = dispatch("cd /no/such/place/shellback");
        assert_eq!(
            reply,
            Reply::text("cd: /no/such/place/shellback: No such file or directory\n")
        );
        assert_eq!(env::current_dir().unwrap(), original);
    }

    #[test]
    fn test_cd_without_argument_reports_error() {
        let _guard = CWD_LOCK.lock().unwrap();
        assert_eq!(
            dispatch("cd"),
            Reply::text("cd: : No such file or directory\n")
        );
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let Reply::Data(output) = dispatch("help") else {
            panic!("expected a data reply");
        };
        let listing = String::from_utf8(output).unwrap();

        assert_eq!(listing.lines().count(), BUILTINS.len());
        for builtin in BUILTINS {
            let line = format!("{}: {}", builtin.name, builtin.description);
            assert!(listing.contains(&line), "missing help line: {line}");
        }
    }

    #[test]
    fn test_transfer_usage_on_missing_arguments() {
        assert_eq!(dispatch("transfer"), Reply::text(TRANSFER_USAGE));
        assert_eq!(dispatch("transfer get"), Reply::text(TRANSFER_USAGE));
        assert_eq!(
            dispatch("transfer sideways file.txt"),
            Reply::text(TRANSFER_USAGE)
        );
    }
}

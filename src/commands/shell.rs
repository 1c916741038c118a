//! Shell fallback for request lines that match no built-in.

use std::process::{Command, Stdio};

/// Run one request line through the system shell and collect its output.
///
/// The reply is stdout followed by stderr, decoded lossily so invalid
/// UTF-8 from arbitrary programs cannot poison the channel. Exit status
/// is not reported; a command that fails loudly does so on stderr. If
/// the shell itself cannot be spawned the reply says so, and the
/// session stays up.
#[must_use]
pub fn run(line: &str) -> String {
    // Stdin is closed so interactive programs see EOF instead of
    // hanging the session.
    match shell_command(line).stdin(Stdio::null()).output() {
        Ok(output) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            combined
        }
        Err(e) => format!("error running command: {e}\n"),
    }
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

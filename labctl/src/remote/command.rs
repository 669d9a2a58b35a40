//! Typed remote commands
//!
//! Remote actions are argument vectors, never interpolated shell strings.
//! Every argument is single-quoted when the command is serialized for the
//! transport, so nothing a caller passes can be reinterpreted by the remote
//! shell. Arguments carrying secrets render as `***` everywhere except in
//! that serialized form. Secrets that must stay out of process listings go
//! over stdin instead.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

/// A single command argument
#[derive(Clone)]
pub enum Arg {
    Plain(String),
    Secret(Arc<SecretString>),
}

impl Arg {
    fn exposed(&self) -> &str {
        match self {
            Arg::Plain(s) => s,
            Arg::Secret(s) => s.expose_secret(),
        }
    }

    fn redacted(&self) -> &str {
        match self {
            Arg::Plain(s) => s,
            Arg::Secret(_) => "***",
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Plain(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Plain(s)
    }
}

#[derive(Clone)]
enum Stdin {
    Plain(Vec<u8>),
    /// One line holding a secret, for `read -r` on the remote side
    Secret(Arc<SecretString>),
}

/// A remote command: program, arguments and optional stdin payload
#[derive(Clone)]
pub struct Command {
    program: String,
    args: Vec<Arg>,
    stdin: Option<Stdin>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that must never be logged
    pub fn secret_arg(mut self, secret: Arc<SecretString>) -> Self {
        self.args.push(Arg::Secret(secret));
        self
    }

    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(Stdin::Plain(payload.into()));
        self
    }

    /// Send `secret` as a single newline-terminated stdin line
    pub fn secret_stdin(mut self, secret: &str) -> Self {
        let line = format!("{}\n", secret);
        self.stdin = Some(Stdin::Secret(Arc::new(SecretString::from(line))));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn stdin_payload(&self) -> Option<&[u8]> {
        match self.stdin.as_ref()? {
            Stdin::Plain(bytes) => Some(bytes),
            Stdin::Secret(line) => Some(line.expose_secret().as_bytes()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.program.trim().is_empty()
    }

    pub fn has_secrets(&self) -> bool {
        matches!(self.stdin, Some(Stdin::Secret(_)))
            || self.args.iter().any(|a| matches!(a, Arg::Secret(_)))
    }

    /// Argument vector with secrets exposed, for local execution
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.exposed().to_string()))
            .collect()
    }

    /// Shell-safe command line for a remote shell, secrets exposed
    pub fn to_remote_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(Arg::exposed))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(Arg::redacted))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&line)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.to_string())
            .field("stdin_bytes", &self.stdin_payload().map(<[u8]>::len))
            .finish()
    }
}

/// POSIX single-quote an argument. Words made only of safe characters are left bare.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

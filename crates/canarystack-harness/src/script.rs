//! Scenario scripts: one stack command per line.
//!
//! ```text
//! # comments and blank lines are ignored
//! create 10
//! push 1
//! pop expect 1
//! pop
//! expect POP_FROM_EMPTY
//! corrupt buffer-byte 0
//! verify
//! expect CORRUPT_BUFFER_HASH
//! dump after corruption
//! destroy
//! ```

use std::fmt;
use std::path::Path;

use canarystack_core::{Elem, ErrorSet};
use thiserror::Error;

/// Errors raised while loading a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: 'expect' must follow an operation")]
    DanglingExpect { line: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw-state damage a script can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    StructGuard,
    BufferGuard,
    BufferByte(usize),
    Size(usize),
    Capacity(usize),
}

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(usize),
    Push(Elem),
    Pop { expect: Option<Elem> },
    Destroy,
    Verify,
    Dump(Option<String>),
    Corrupt(Corruption),
    /// Assert the previous step's flags.
    Expect(ErrorSet),
}

impl Command {
    /// Keyword as it appears in scripts and logs.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Push(_) => "push",
            Self::Pop { .. } => "pop",
            Self::Destroy => "destroy",
            Self::Verify => "verify",
            Self::Dump(_) => "dump",
            Self::Corrupt(_) => "corrupt",
            Self::Expect(_) => "expect",
        }
    }

    /// True for commands that produce an `ErrorSet` an `expect` can check.
    #[must_use]
    pub fn is_operation(&self) -> bool {
        !matches!(self, Self::Expect(_) | Self::Corrupt(_) | Self::Dump(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(n) => write!(f, "create {n}"),
            Self::Push(v) => write!(f, "push {v}"),
            Self::Pop { expect: None } => f.write_str("pop"),
            Self::Pop { expect: Some(v) } => write!(f, "pop expect {v}"),
            Self::Destroy => f.write_str("destroy"),
            Self::Verify => f.write_str("verify"),
            Self::Dump(None) => f.write_str("dump"),
            Self::Dump(Some(m)) => write!(f, "dump {m}"),
            Self::Corrupt(c) => match c {
                Corruption::StructGuard => f.write_str("corrupt struct-guard"),
                Corruption::BufferGuard => f.write_str("corrupt buffer-guard"),
                Corruption::BufferByte(i) => write!(f, "corrupt buffer-byte {i}"),
                Corruption::Size(n) => write!(f, "corrupt size {n}"),
                Corruption::Capacity(n) => write!(f, "corrupt capacity {n}"),
            },
            Self::Expect(set) => write!(f, "expect {set}"),
        }
    }
}

/// A command and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub command: Command,
}

/// A parsed script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut steps: Vec<Step> = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let body = raw.split_once('#').map_or(raw, |(code, _)| code).trim();
            if body.is_empty() {
                continue;
            }
            let command = parse_command(line, body)?;
            if matches!(command, Command::Expect(_))
                && !steps.last().is_some_and(|s| s.command.is_operation())
            {
                return Err(ScriptError::DanglingExpect { line });
            }
            steps.push(Step { line, command });
        }
        Ok(Self { steps })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_command(line: usize, body: &str) -> Result<Command, ScriptError> {
    let mut words = body.split_whitespace();
    let keyword = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let command = match (keyword.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("create", []) => Command::Create(0),
        ("create", [n]) => Command::Create(number(line, n)?),
        ("push", [v]) => Command::Push(number(line, v)?),
        ("pop", []) => Command::Pop { expect: None },
        ("pop", ["expect", v]) => Command::Pop {
            expect: Some(number(line, v)?),
        },
        ("destroy", []) => Command::Destroy,
        ("verify", []) => Command::Verify,
        ("dump", []) => Command::Dump(None),
        ("dump", _) => {
            let message = body[keyword.len()..].trim();
            Command::Dump(Some(message.to_string()))
        }
        ("corrupt", [what, rest @ ..]) => Command::Corrupt(parse_corruption(line, what, rest)?),
        ("expect", [_, ..]) => {
            let flags = args.concat();
            let set = ErrorSet::parse(&flags).ok_or_else(|| ScriptError::Syntax {
                line,
                message: format!("unknown flag in '{flags}'"),
            })?;
            Command::Expect(set)
        }
        ("create" | "push" | "pop" | "destroy" | "verify" | "corrupt" | "expect", _) => {
            return Err(ScriptError::Syntax {
                line,
                message: format!("bad arguments for '{keyword}'"),
            });
        }
        _ => {
            return Err(ScriptError::UnknownCommand {
                line,
                command: keyword.to_string(),
            });
        }
    };
    Ok(command)
}

fn parse_corruption(line: usize, what: &str, rest: &[&str]) -> Result<Corruption, ScriptError> {
    let corruption = match (what, rest) {
        ("struct-guard", []) => Corruption::StructGuard,
        ("buffer-guard", []) => Corruption::BufferGuard,
        ("buffer-byte", [i]) => Corruption::BufferByte(number(line, i)?),
        ("size", [n]) => Corruption::Size(number(line, n)?),
        ("capacity", [n]) => Corruption::Capacity(number(line, n)?),
        _ => {
            return Err(ScriptError::Syntax {
                line,
                message: format!("unknown corruption '{what}'"),
            });
        }
    };
    Ok(corruption)
}

fn number<T: std::str::FromStr>(line: usize, text: &str) -> Result<T, ScriptError> {
    text.parse().map_err(|_| ScriptError::Syntax {
        line,
        message: format!("expected a number, got '{text}'"),
    })
}

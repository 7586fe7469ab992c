//! Command allow-list policy
//!
//! A command may run only if its base command (first token, directory
//! prefix stripped) is on the list for the calling context. Nothing else
//! about the command line is inspected.

use std::collections::BTreeSet;

use kaien_config::{OSINT_COMMANDS, SHELL_COMMANDS};

/// Allow-list of base commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    allowed: BTreeSet<String>,
}

impl CommandPolicy {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: commands
                .into_iter()
                .map(|c| {
                    let c: String = c.into();
                    c.trim().to_string()
                })
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Reconnaissance context
    pub fn osint() -> Self {
        Self::new(OSINT_COMMANDS.iter().copied())
    }

    /// General shell context (administrative helpers)
    pub fn shell() -> Self {
        Self::new(SHELL_COMMANDS.iter().copied())
    }

    pub fn is_permitted(&self, command: &str) -> bool {
        match base_command(command) {
            Some(base) => self.allowed.contains(base),
            None => false,
        }
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Comma-separated list for tool descriptions and denial messages
    pub fn describe(&self) -> String {
        self.allowed().collect::<Vec<_>>().join(", ")
    }
}

/// First whitespace token with any directory prefix removed.
///
/// `/usr/bin/nmap -F host` gives `nmap`. Returns `None` for blank input
/// or a token that ends in `/`.
pub fn base_command(command: &str) -> Option<&str> {
    let first = command.split_whitespace().next()?;
    let base = first.rsplit('/').next().unwrap_or(first);
    if base.is_empty() {
        None
    } else {
        Some(base)
    }
}

//! Command definitions
//!
//! Represents commands from clients.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Quit,
    Insert,
    Find,
    Delete,
    Keys,
}

impl CommandType {
    /// The verb as typed on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            CommandType::Quit => "quit",
            CommandType::Insert => "insert",
            CommandType::Find => "find",
            CommandType::Delete => "delete",
            CommandType::Keys => "keys",
        }
    }

    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "quit" => Some(CommandType::Quit),
            "insert" => Some(CommandType::Insert),
            "find" => Some(CommandType::Find),
            "delete" => Some(CommandType::Delete),
            "keys" => Some(CommandType::Keys),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value under a key
    Insert { key: String, value: String },

    /// Look up a key
    Find { key: String },

    /// Remove a key and its value
    Delete { key: String },

    /// List keys, optionally by prefix
    Keys { prefix: Option<String> },

    /// End the session
    Quit,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Insert { .. } => CommandType::Insert,
            Command::Find { .. } => CommandType::Find,
            Command::Delete { .. } => CommandType::Delete,
            Command::Keys { .. } => CommandType::Keys,
            Command::Quit => CommandType::Quit,
        }
    }
}

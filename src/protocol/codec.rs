//! Protocol codec
//!
//! Parsing and framing for the line protocol.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! <verb> [arg ...]\n        (tokens separated by one or more spaces)
//! ```
//!
//! ### Response
//! ```text
//! STATUS: <NAME>\n
//! SIZE: <message byte length>\n
//! <message>\n
//! \n
//! ```

use std::io::{BufRead, Read, Write};

use crate::error::{BlockError, Result};

use super::{Command, CommandType, Response, Status};

/// Most tokens accepted in one request line
pub const MAX_ARGS: usize = 100;

/// Response terminator following the message
const TERMINATOR: &[u8; 2] = b"\n\n";

// =============================================================================
// Command Parsing/Encoding
// =============================================================================

/// Split a request line into space-separated tokens
///
/// Runs of spaces count as one separator.
pub fn tokenize(line: &str) -> Result<Vec<&str>> {
    let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.len() > MAX_ARGS {
        return Err(BlockError::Argument("Too many arguments.".to_string()));
    }
    Ok(tokens)
}

/// Parse one request line (line terminator optional)
pub fn parse_command(line: &str) -> Result<Command> {
    let line = match line.find(&['\r', '\n'][..]) {
        Some(end) => &line[..end],
        None => line,
    };
    let tokens = tokenize(line)?;

    let Some(command_type) = tokens.first().and_then(|verb| CommandType::from_verb(verb)) else {
        return Err(BlockError::UnknownCommand);
    };

    let missing = || BlockError::Argument("Arguments missing.".to_string());

    match command_type {
        CommandType::Quit => Ok(Command::Quit),
        CommandType::Insert => {
            if tokens.len() < 3 {
                return Err(missing());
            }
            Ok(Command::Insert {
                key: tokens[1].to_string(),
                value: tokens[2..].join(" "),
            })
        }
        CommandType::Find => {
            let key = tokens.get(1).ok_or_else(missing)?;
            Ok(Command::Find {
                key: key.to_string(),
            })
        }
        CommandType::Delete => {
            let key = tokens.get(1).ok_or_else(missing)?;
            Ok(Command::Delete {
                key: key.to_string(),
            })
        }
        CommandType::Keys => Ok(Command::Keys {
            prefix: tokens.get(1).map(|p| p.to_string()),
        }),
    }
}

/// Parse raw request bytes
pub fn parse_line(bytes: &[u8]) -> Result<Command> {
    let line = std::str::from_utf8(bytes)
        .map_err(|_| BlockError::Argument("Request is not valid UTF-8.".to_string()))?;
    parse_command(line)
}

/// Encode a command as a request line
pub fn encode_command(command: &Command) -> String {
    let verb = command.command_type().verb();
    match command {
        Command::Insert { key, value } => format!("{} {} {}\n", verb, key, value),
        Command::Find { key } | Command::Delete { key } => format!("{} {}\n", verb, key),
        Command::Keys { prefix: Some(prefix) } => format!("{} {}\n", verb, prefix),
        Command::Keys { prefix: None } | Command::Quit => format!("{}\n", verb),
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut message = format!(
        "STATUS: {}\nSIZE: {}\n",
        response.status.name(),
        response.message.len()
    )
    .into_bytes();
    message.extend_from_slice(response.message.as_bytes());
    message.extend_from_slice(TERMINATOR);
    message
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let mut reader = bytes;
    read_response(&mut reader)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one request line, without its terminator
///
/// Blocks until a `\n` arrives. The line buffer grows as needed up to
/// `max_line_bytes`. EOF before any byte is `UnexpectedEof`.
pub fn read_line<R: BufRead>(reader: &mut R, max_line_bytes: usize) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let limit = max_line_bytes as u64 + 1;
    let n = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;

    if n == 0 {
        return Err(BlockError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "client closed the connection",
        )));
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    } else if line.len() > max_line_bytes {
        return Err(BlockError::Protocol(format!(
            "Request line exceeds {} bytes",
            max_line_bytes
        )));
    }
    Ok(line)
}

/// Read and parse one command from a stream
pub fn read_command<R: BufRead>(reader: &mut R, max_line_bytes: usize) -> Result<Command> {
    let line = read_line(reader, max_line_bytes)?;
    parse_line(&line)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(encode_command(command).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Response> {
    let status_name = read_header(reader, "STATUS: ")?;
    let status = Status::from_name(&status_name).ok_or_else(|| {
        BlockError::Protocol(format!("Unknown response status: {}", status_name))
    })?;

    let size = read_header(reader, "SIZE: ")?;
    let size: usize = size
        .parse()
        .map_err(|_| BlockError::Protocol(format!("Invalid response size: {}", size)))?;

    let mut message = vec![0u8; size];
    reader.read_exact(&mut message)?;
    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator)?;
    if &terminator != TERMINATOR {
        return Err(BlockError::Protocol(
            "Missing response terminator".to_string(),
        ));
    }

    let message = String::from_utf8(message)
        .map_err(|_| BlockError::Protocol("Response is not valid UTF-8".to_string()))?;
    Ok(Response { status, message })
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

/// Read a `<name><value>\n` header line and return the value
fn read_header<R: BufRead>(reader: &mut R, name: &str) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(BlockError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        )));
    }
    let value = line
        .trim_end_matches(&['\r', '\n'][..])
        .strip_prefix(name)
        .ok_or_else(|| BlockError::Protocol(format!("Expected {:?} header", name.trim())))?;
    Ok(value.to_string())
}

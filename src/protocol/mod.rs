//! Protocol Module
//!
//! Defines the line protocol for client-server communication.
//!
//! ## Request Format
//! One command per line, space-tokenized, at most `MAX_ARGS` tokens:
//! ```text
//! insert <key> <value...>
//! find <key>
//! delete <key>
//! keys [prefix]
//! quit
//! ```
//!
//! ## Response Format
//! ```text
//! ┌──────────────────────┬──────────────────┬───────────┬──────┐
//! │ STATUS: <NAME>\n     │ SIZE: <len>\n    │ message   │ \n\n │
//! └──────────────────────┴──────────────────┴───────────┴──────┘
//! ```
//!
//! ## Status Names
//! - OK, ERROR, NOT_FOUND, ARGUMENT_ERROR, ALLOCATION_FAILURE,
//!   IO_FAILURE, CORRUPTION, UNKNOWN_COMMAND

mod codec;
mod command;
mod response;

pub use codec::{
    decode_response, encode_command, encode_response, parse_command, parse_line, read_command,
    read_line, read_response, tokenize, write_command, write_response, MAX_ARGS,
};
pub use command::{Command, CommandType};
pub use response::{Response, Status};

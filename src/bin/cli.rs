//! BlockKV CLI Client
//!
//! Command-line interface for interacting with BlockKV.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::process::ExitCode;

use blockkv::protocol::{read_response, write_command, Command, Status};
use clap::{Parser, Subcommand};

/// BlockKV CLI
#[derive(Parser, Debug)]
#[command(name = "blockkv-cli")]
#[command(about = "CLI for the BlockKV key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value under a key
    Insert {
        /// The key to insert
        key: String,

        /// The value (words are joined by single spaces)
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },

    /// Look up a value by key
    Find {
        /// The key to find
        key: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// List keys in order
    Keys {
        /// Only list keys starting with this prefix
        prefix: Option<String>,
    },
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Insert { key, value } => Command::Insert {
                key,
                value: value.join(" "),
            },
            Commands::Find { key } => Command::Find { key },
            Commands::Delete { key } => Command::Delete { key },
            Commands::Keys { prefix } => Command::Keys { prefix },
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args.server, args.command.into()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Send one command, print the reply, and report whether it succeeded
fn run(server: &str, command: Command) -> blockkv::Result<bool> {
    let stream = TcpStream::connect(server)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    write_command(&mut writer, &command)?;
    let response = read_response(&mut reader)?;
    let _ = write_command(&mut writer, &Command::Quit);

    if response.status == Status::Ok {
        if !response.message.is_empty() {
            println!("{}", response.message);
        }
        Ok(true)
    } else {
        eprintln!("{}: {}", response.status.name(), response.message);
        Ok(false)
    }
}

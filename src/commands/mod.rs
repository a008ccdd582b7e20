pub mod blpop;
pub mod client;
pub mod command;
pub mod echo;
pub mod executable;
pub mod get;
pub mod incr;
pub mod info;
pub mod llen;
pub mod lpop;
pub mod lrange;
pub mod ping;
pub mod push;
pub mod set;
pub mod type_;

use bytes::Bytes;
use std::{str, vec};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use blpop::Blpop;
use client::Client;
use command::Command as Command_;
use echo::Echo;
use get::Get;
use incr::Incr;
use info::Info;
use llen::Llen;
use lpop::Lpop;
use lrange::Lrange;
use ping::Ping;
use push::{Lpush, Rpush};
use set::Set;
use type_::Type;

/// Names of the commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CommandKind {
    Blpop,
    Client,
    Command,
    Echo,
    Get,
    Incr,
    Info,
    Llen,
    Lpop,
    Lpush,
    Lrange,
    Ping,
    Rpush,
    Set,
    Type,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Get(Get),
    Incr(Incr),
    Set(Set),
    Type(Type),

    Blpop(Blpop),
    Llen(Llen),
    Lpop(Lpop),
    Lpush(Lpush),
    Lrange(Lrange),
    Rpush(Rpush),

    Client(Client),
    Command(Command_),
    Echo(Echo),
    Info(Info),
    Ping(Ping),
}

impl Command {
    pub async fn exec(self, store: Store) -> Result<Frame, Error> {
        match self {
            Command::Blpop(cmd) => cmd.exec(store).await,
            Command::Client(cmd) => cmd.exec(store),
            Command::Command(cmd) => cmd.exec(store),
            Command::Echo(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Incr(cmd) => cmd.exec(store),
            Command::Info(cmd) => cmd.exec(store),
            Command::Llen(cmd) => cmd.exec(store),
            Command::Lpop(cmd) => cmd.exec(store),
            Command::Lpush(cmd) => cmd.exec(store),
            Command::Lrange(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Rpush(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
            Command::Type(cmd) => cmd.exec(store),
        }
    }

    /// Runs the command without ever suspending. Used inside transactions, where a blocking pop
    /// on an empty list behaves as if its timeout elapsed right away.
    pub fn exec_now(self, store: Store) -> Result<Frame, Error> {
        match self {
            Command::Blpop(cmd) => cmd.exec_now(store),
            Command::Client(cmd) => cmd.exec(store),
            Command::Command(cmd) => cmd.exec(store),
            Command::Echo(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Incr(cmd) => cmd.exec(store),
            Command::Info(cmd) => cmd.exec(store),
            Command::Llen(cmd) => cmd.exec(store),
            Command::Lpop(cmd) => cmd.exec(store),
            Command::Lpush(cmd) => cmd.exec(store),
            Command::Lrange(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Rpush(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
            Command::Type(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => return Err(CommandParserError::NotACommand(frame)),
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = match parser.next_string() {
            Ok(name) => name,
            Err(CommandParserError::EndOfStream) => return Err(CommandParserError::EmptyCommand),
            Err(e) => return Err(e),
        };

        let kind: CommandKind = command_name
            .parse()
            .map_err(|_| CommandParserError::UnknownCommand {
                command: command_name.clone(),
            })?;

        let command = match kind {
            CommandKind::Blpop => Blpop::try_from(&mut *parser).map(Command::Blpop),
            CommandKind::Client => Client::try_from(&mut *parser).map(Command::Client),
            CommandKind::Command => Command_::try_from(&mut *parser).map(Command::Command),
            CommandKind::Echo => Echo::try_from(&mut *parser).map(Command::Echo),
            CommandKind::Get => Get::try_from(&mut *parser).map(Command::Get),
            CommandKind::Incr => Incr::try_from(&mut *parser).map(Command::Incr),
            CommandKind::Info => Info::try_from(&mut *parser).map(Command::Info),
            CommandKind::Llen => Llen::try_from(&mut *parser).map(Command::Llen),
            CommandKind::Lpop => Lpop::try_from(&mut *parser).map(Command::Lpop),
            CommandKind::Lpush => Lpush::try_from(&mut *parser).map(Command::Lpush),
            CommandKind::Lrange => Lrange::try_from(&mut *parser).map(Command::Lrange),
            CommandKind::Ping => Ping::try_from(&mut *parser).map(Command::Ping),
            CommandKind::Rpush => Rpush::try_from(&mut *parser).map(Command::Rpush),
            CommandKind::Set => Set::try_from(&mut *parser).map(Command::Set),
            CommandKind::Type => Type::try_from(&mut *parser).map(Command::Type),
        };

        // Running out of arguments and leaving some unused are both arity errors.
        let wrong_arity = || CommandParserError::WrongNumberOfArguments {
            command: kind.to_string(),
        };
        let command = command.map_err(|e| match e {
            CommandParserError::EndOfStream => wrong_arity(),
            e => e,
        })?;
        if !parser.is_empty() {
            return Err(wrong_arity());
        }

        Ok(command)
    }
}

/// Returns the lowercased name of the command in `frame`, if it looks like a command at all.
pub fn command_name(frame: &Frame) -> Option<String> {
    let Frame::Array(parts) = frame else {
        return None;
    };

    match parts.first()? {
        Frame::Simple(s) => Some(s.to_lowercase()),
        Frame::Bulk(bytes) => str::from_utf8(bytes).ok().map(str::to_lowercase),
        _ => None,
    }
}

pub struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn is_empty(&self) -> bool {
        self.parts.len() == 0
    }

    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        match self.next_frame()? {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        match self.next_frame()? {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(string) => string
                .parse::<i64>()
                .map_err(|_| CommandParserError::InvalidInteger),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map_err(|_| CommandParserError::InvalidInteger)?
                .parse::<i64>()
                .map_err(|_| CommandParserError::InvalidInteger),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_float(&mut self) -> Result<f64, CommandParserError> {
        let string = self.next_string()?;
        string
            .parse::<f64>()
            .map_err(|_| CommandParserError::InvalidTimeout)
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        match self.next_frame()? {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Consumes the remaining arguments, for commands that accept and ignore them.
    fn skip_rest(&mut self) {
        self.parts.by_ref().for_each(drop);
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR protocol error")]
    NotACommand(Frame),
    #[error("ERR protocol error")]
    EmptyCommand,
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
    #[error("ERR value is not an integer or out of range")]
    InvalidInteger,
    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,
    #[error("ERR timeout is negative")]
    NegativeTimeout,
    #[error("ERR invalid expire time in '{command}' command")]
    InvalidExpireTime { command: String },
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
}

impl CommandParserError {
    /// Errors after which the connection cannot be trusted to stay in sync and is closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CommandParserError::NotACommand(_)
                | CommandParserError::EmptyCommand
                | CommandParserError::UnknownCommand { .. }
        )
    }
}

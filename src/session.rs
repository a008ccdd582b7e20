use strum_macros::EnumString;
use thiserror::Error as ThisError;
use tracing::debug;
use uuid::Uuid;

use crate::commands::{command_name, Command, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

#[derive(Debug, ThisError, PartialEq)]
pub enum TransactionError {
    #[error("ERR {0} without MULTI")]
    WithoutMulti(&'static str),
}

/// Commands that drive the transaction state of a session instead of touching the store.
#[derive(Debug, Clone, Copy, PartialEq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum TransactionControl {
    Multi,
    Exec,
    Discard,
}

/// Per connection command execution state. Outside a transaction every command runs right
/// away; between `MULTI` and `EXEC` commands are queued, unvalidated, and run together.
pub struct Session {
    pub id: Uuid,
    store: Store,
    transaction: Option<Vec<Frame>>,
}

impl Session {
    pub fn new(id: Uuid, store: Store) -> Session {
        Session {
            id,
            store,
            transaction: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Applies one client frame and returns the reply to send back.
    ///
    /// Errors of a single command become error replies. Only errors after which the connection
    /// has to be closed are returned as `Err`.
    pub async fn apply(&mut self, frame: Frame) -> Result<Frame, CommandParserError> {
        let control: Option<TransactionControl> =
            command_name(&frame).and_then(|name| name.parse().ok());

        match control {
            Some(TransactionControl::Multi) => {
                if self.transaction.is_some() {
                    debug!("MULTI while queueing, dropping the queued commands");
                }
                self.transaction = Some(Vec::new());
                Ok(Frame::Simple("OK".to_string()))
            }
            Some(TransactionControl::Exec) => match self.transaction.take() {
                Some(queued) => Ok(self.exec_transaction(queued)),
                None => Ok(error_reply(TransactionError::WithoutMulti("EXEC"))),
            },
            Some(TransactionControl::Discard) => match self.transaction.take() {
                Some(queued) => {
                    debug!(discarded = queued.len(), "transaction discarded");
                    Ok(Frame::Simple("OK".to_string()))
                }
                None => Ok(error_reply(TransactionError::WithoutMulti("DISCARD"))),
            },
            None => {
                // Frames that are not commands at all are still rejected right away.
                if let Some(queue) = self.transaction.as_mut() {
                    if command_name(&frame).is_some() {
                        queue.push(frame);
                        return Ok(Frame::Simple("QUEUED".to_string()));
                    }
                }
                self.execute(frame).await
            }
        }
    }

    async fn execute(&self, frame: Frame) -> Result<Frame, CommandParserError> {
        let command = match Command::try_from(frame) {
            Ok(command) => command,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(error_reply(e)),
        };

        debug!(?command, "executing command");
        match command.exec(self.store.clone()).await {
            Ok(reply) => Ok(reply),
            Err(e) => Ok(Frame::Error(e.to_string())),
        }
    }

    /// Runs queued frames in order. Nothing else on this connection runs in between, but other
    /// connections may interleave.
    fn exec_transaction(&self, queued: Vec<Frame>) -> Frame {
        debug!(commands = queued.len(), "executing transaction");

        let replies = queued
            .into_iter()
            .map(|frame| {
                let command = match Command::try_from(frame) {
                    Ok(command) => command,
                    Err(e) => return error_reply(e),
                };

                command
                    .exec_now(self.store.clone())
                    .unwrap_or_else(|e| Frame::Error(e.to_string()))
            })
            .collect();

        Frame::Array(replies)
    }
}

fn error_reply(e: impl std::error::Error) -> Frame {
    Frame::Error(e.to_string())
}

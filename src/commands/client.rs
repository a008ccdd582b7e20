use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Client connection management. Clients send `CLIENT SETINFO` right after connecting; every
/// subcommand is accepted and acknowledged without effect.
///
/// Ref: <https://redis.io/docs/latest/commands/client/>
#[derive(Debug, PartialEq)]
pub struct Client {
    pub subcommand: String,
}

impl Executable for Client {
    fn exec(self, _store: Store) -> Result<Frame, Error> {
        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Client {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?.to_lowercase();
        parser.skip_rest();

        Ok(Self { subcommand })
    }
}

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Command introspection, probed by clients on connect. No command documentation is provided.
///
/// Ref: <https://redis.io/docs/latest/commands/command/>
#[derive(Debug, PartialEq)]
pub struct Command;

impl Executable for Command {
    fn exec(self, _store: Store) -> Result<Frame, Error> {
        Ok(Frame::Array(vec![]))
    }
}

impl TryFrom<&mut CommandParser> for Command {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.skip_rest();
        Ok(Self)
    }
}

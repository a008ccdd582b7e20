use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns information about the server. Only the `replication` section is available, and it is
/// returned whatever section is asked for.
///
/// Ref: <https://redis.io/docs/latest/commands/info/>
#[derive(Debug, PartialEq)]
pub struct Info {
    pub section: Option<String>,
}

impl Executable for Info {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let info = store.role().info();

        Ok(Frame::Bulk(Bytes::from(info)))
    }
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let section = match parser.next_string() {
            Ok(section) => Some(section.to_lowercase()),
            Err(CommandParserError::EndOfStream) => None,
            Err(e) => return Err(e),
        };
        parser.skip_rest();

        Ok(Self { section })
    }
}

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes and returns the first elements of the list stored at `key`.
///
/// Without `count` the reply is a single element, or nil when the list is empty. With `count`
/// it is an array of up to `count` elements, or a nil array when the key does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/lpop/>
#[derive(Debug, PartialEq)]
pub struct Lpop {
    pub key: String,
    pub count: Option<usize>,
}

impl Executable for Lpop {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut store = store.lock();

        let Some(count) = self.count else {
            let value = store.lpop(&self.key, 1)?.pop();
            return Ok(value.map_or(Frame::Null, Frame::Bulk));
        };

        if !store.exists(&self.key) {
            // Still rejects keys of the wrong type before replying.
            store.lpop(&self.key, 0)?;
            return Ok(Frame::NullArray);
        }

        let values = store.lpop(&self.key, count)?;
        Ok(Frame::Array(values.into_iter().map(Frame::Bulk).collect()))
    }
}

impl TryFrom<&mut CommandParser> for Lpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let count = match parser.next_integer() {
            Ok(count) => {
                let count =
                    usize::try_from(count).map_err(|_| CommandParserError::InvalidInteger)?;
                Some(count)
            }
            Err(CommandParserError::EndOfStream) => None,
            Err(e) => return Err(e),
        };

        Ok(Self { key, count })
    }
}

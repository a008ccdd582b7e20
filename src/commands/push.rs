use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Side, Store};
use crate::Error;

/// Insert all the specified values at the tail of the list stored at `key`. If `key` does not
/// exist, it is created as an empty list before performing the push operation.
///
/// Returns the length of the list after the push. Elements handed directly to clients blocked
/// on the key are counted too.
///
/// Ref: <https://redis.io/docs/latest/commands/rpush/>
#[derive(Debug, PartialEq)]
pub struct Rpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

/// Insert all the specified values at the head of the list stored at `key`, one after the
/// other, so `LPUSH mylist a b c` leaves `c` as the first element.
///
/// Ref: <https://redis.io/docs/latest/commands/lpush/>
#[derive(Debug, PartialEq)]
pub struct Lpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Rpush {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        push(store, &self.key, self.values, Side::Right)
    }
}

impl Executable for Lpush {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        push(store, &self.key, self.values, Side::Left)
    }
}

fn push(store: Store, key: &str, values: Vec<Bytes>, side: Side) -> Result<Frame, Error> {
    let length = store.lock().push(key, values, side)?;

    Ok(Frame::Integer(length as i64))
}

fn parse(parser: &mut CommandParser) -> Result<(String, Vec<Bytes>), CommandParserError> {
    let key = parser.next_string()?;

    let mut values = vec![parser.next_bytes()?];
    while !parser.is_empty() {
        values.push(parser.next_bytes()?);
    }

    Ok((key, values))
}

impl TryFrom<&mut CommandParser> for Rpush {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let (key, values) = parse(parser)?;
        Ok(Self { key, values })
    }
}

impl TryFrom<&mut CommandParser> for Lpush {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let (key, values) = parse(parser)?;
        Ok(Self { key, values })
    }
}

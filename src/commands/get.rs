use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

impl Executable for Get {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let value = store.lock().get(&self.key)?;

        match value {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::Null),
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::Side;
    use bytes::Bytes;

    #[tokio::test]
    async fn existing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Get(Get {
                key: String::from("key1")
            })
        );

        let store = Store::new();
        store.lock().set(String::from("key1"), Bytes::from("1"));

        let result = cmd.exec(store.clone()).await.unwrap();

        assert_eq!(result, Frame::Bulk(Bytes::from("1")));
    }

    #[tokio::test]
    async fn missing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        let result = cmd.exec(Store::new()).await.unwrap();

        assert_eq!(result, Frame::Null);
    }

    #[tokio::test]
    async fn list_key() {
        let store = Store::new();
        store
            .lock()
            .push("key1", vec![Bytes::from("a")], Side::Right)
            .unwrap();

        let cmd = Command::try_from(Frame::bulk_array(["GET", "key1"])).unwrap();
        let err = cmd.exec(store.clone()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }
}

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the length of the list stored at `key`, 0 when the key does not hold a list.
///
/// Ref: <https://redis.io/docs/latest/commands/llen/>
#[derive(Debug, PartialEq)]
pub struct Llen {
    pub key: String,
}

impl Executable for Llen {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let length = store.lock().llen(&self.key);

        Ok(Frame::Integer(length as i64))
    }
}

impl TryFrom<&mut CommandParser> for Llen {
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
    async fn list_length() {
        let store = Store::new();
        store
            .lock()
            .push("list", vec![Bytes::from("a"), Bytes::from("b")], Side::Right)
            .unwrap();

        let cmd = Command::try_from(Frame::bulk_array(["LLEN", "list"])).unwrap();
        assert_eq!(cmd, Command::Llen(Llen { key: "list".to_string() }));

        assert_eq!(cmd.exec(store.clone()).await.unwrap(), Frame::Integer(2));
    }

    #[tokio::test]
    async fn missing_key() {
        let cmd = Command::try_from(Frame::bulk_array(["LLEN", "list"])).unwrap();

        assert_eq!(cmd.exec(Store::new()).await.unwrap(), Frame::Integer(0));
    }

    #[tokio::test]
    async fn string_key_has_no_length() {
        let store = Store::new();
        store.lock().set("key".to_string(), Bytes::from("value"));

        let cmd = Command::try_from(Frame::bulk_array(["LLEN", "key"])).unwrap();

        assert_eq!(cmd.exec(store.clone()).await.unwrap(), Frame::Integer(0));
    }
}

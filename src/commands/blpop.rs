use bytes::Bytes;
use tokio::time::Duration;
use tracing::debug;

use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes and returns the first element of the list stored at `key`, blocking the connection
/// until an element is pushed when the list is empty.
///
/// `timeout` is given in seconds, with decimals; 0 blocks indefinitely. The reply is a
/// two-element array of the key and the element, or a nil array when the timeout elapses.
///
/// Ref: <https://redis.io/docs/latest/commands/blpop/>
#[derive(Debug, PartialEq)]
pub struct Blpop {
    pub key: String,
    pub timeout: Option<Duration>,
}

impl Blpop {
    pub async fn exec(self, store: Store) -> Result<Frame, Error> {
        let value = store.blocking_pop(&self.key, self.timeout).await?;

        if value.is_none() {
            debug!(key = %self.key, "blocking pop timed out");
        }

        Ok(self.reply(value))
    }

    /// Pops without waiting, replying as if the timeout elapsed when the list is empty.
    pub fn exec_now(self, store: Store) -> Result<Frame, Error> {
        let value = store.lock().lpop(&self.key, 1)?.pop();

        Ok(self.reply(value))
    }

    fn reply(self, value: Option<Bytes>) -> Frame {
        match value {
            Some(value) => Frame::Array(vec![
                Frame::Bulk(Bytes::from(self.key)),
                Frame::Bulk(value),
            ]),
            None => Frame::NullArray,
        }
    }
}

impl TryFrom<&mut CommandParser> for Blpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let seconds = parser.next_float()?;

        if seconds.is_sign_negative() && seconds != 0.0 {
            return Err(CommandParserError::NegativeTimeout);
        }

        let timeout = if seconds == 0.0 {
            None
        } else {
            let timeout = Duration::try_from_secs_f64(seconds)
                .map_err(|_| CommandParserError::InvalidTimeout)?;
            Some(timeout)
        };

        Ok(Self { key, timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::Side;
    use tokio::time::{self, Instant};

    #[test]
    fn parse_timeouts() {
        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0"])).unwrap();
        assert_eq!(
            cmd,
            Command::Blpop(Blpop {
                key: "list".to_string(),
                timeout: None
            })
        );

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0.1"])).unwrap();
        assert_eq!(
            cmd,
            Command::Blpop(Blpop {
                key: "list".to_string(),
                timeout: Some(Duration::from_millis(100))
            })
        );

        let err = Command::try_from(Frame::bulk_array(["BLPOP", "list", "-1"])).unwrap_err();
        assert_eq!(err, CommandParserError::NegativeTimeout);

        for timeout in ["soon", "inf", "NaN"] {
            let err =
                Command::try_from(Frame::bulk_array(["BLPOP", "list", timeout])).unwrap_err();
            assert_eq!(err, CommandParserError::InvalidTimeout);
        }
    }

    #[tokio::test]
    async fn pops_available_element() {
        let store = Store::new();
        store
            .lock()
            .push("list", vec![Bytes::from("a")], Side::Right)
            .unwrap();

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0"])).unwrap();

        assert_eq!(
            cmd.exec(store.clone()).await.unwrap(),
            Frame::bulk_array(["list", "a"])
        );
    }

    #[tokio::test]
    async fn woken_by_push() {
        let store = Store::new();

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0"])).unwrap();
        let blocked = tokio::spawn(cmd.exec(store.clone()));

        while store.lock().waiting("list") == 0 {
            tokio::task::yield_now().await;
        }
        let length = store
            .lock()
            .push("list", vec![Bytes::from("v")], Side::Right)
            .unwrap();

        assert_eq!(length, 1);
        assert_eq!(blocked.await.unwrap().unwrap(), Frame::bulk_array(["list", "v"]));
        // The element went straight to the blocked client.
        assert_eq!(store.lock().lrange("list", 0, -1), Ok(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let store = Store::new();
        let start = Instant::now();

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0.1"])).unwrap();
        let result = cmd.exec(store.clone()).await.unwrap();

        assert_eq!(result, Frame::NullArray);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(store.lock().waiting("list"), 0);
    }

    #[tokio::test]
    async fn exec_now_does_not_wait() {
        let store = Store::new();

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "list", "0"])).unwrap();

        assert_eq!(cmd.exec_now(store.clone()).unwrap(), Frame::NullArray);
        assert_eq!(store.lock().waiting("list"), 0);
    }

    #[tokio::test]
    async fn string_key() {
        let store = Store::new();
        store.lock().set("key".to_string(), Bytes::from("v"));

        let cmd = Command::try_from(Frame::bulk_array(["BLPOP", "key", "0"])).unwrap();
        let err = cmd.exec(store.clone()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }
}

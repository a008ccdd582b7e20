use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Set `key` to hold the string `value`. If key already holds a value, it is overwritten,
/// regardless of its type. Any previous time to live associated with the key is discarded.
///
/// Options:
///
/// * `PX milliseconds`: set the specified expire time, in milliseconds.
/// * `EX seconds`: set the specified expire time, in seconds.
/// * `EXAT timestamp`: set the specified Unix time at which the key will expire, in seconds.
///
/// When more than one is given, `PX` wins over `EX`, which wins over `EXAT`.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq, Default)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub px: Option<u64>,
    pub ex: Option<u64>,
    pub exat: Option<u64>,
}

impl Set {
    fn ttl(&self) -> Option<Duration> {
        if let Some(px) = self.px {
            return Some(Duration::from_millis(px));
        }
        if let Some(ex) = self.ex {
            return Some(Duration::from_secs(ex));
        }

        // A timestamp in the past leaves a key that is already expired.
        self.exat.map(|exat| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            Duration::from_secs(exat).saturating_sub(now)
        })
    }
}

impl Executable for Set {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let ttl = self.ttl();
        let mut store = store.lock();

        match ttl {
            Some(ttl) => store.set_with_ttl(self.key, self.value, ttl),
            None => store.set(self.key, self.value),
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let mut set = Set {
            key,
            value,
            ..Default::default()
        };

        while !parser.is_empty() {
            let option = parser.next_string()?.to_uppercase();
            let slot = match option.as_str() {
                "PX" => &mut set.px,
                "EX" => &mut set.ex,
                "EXAT" => &mut set.exat,
                _ => return Err(CommandParserError::Syntax),
            };

            let time = match parser.next_integer() {
                Ok(time) => time,
                Err(CommandParserError::EndOfStream) => return Err(CommandParserError::Syntax),
                Err(e) => return Err(e),
            };
            if time <= 0 {
                return Err(CommandParserError::InvalidExpireTime {
                    command: "set".to_string(),
                });
            }

            *slot = Some(time as u64);
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::store::Side;
    use tokio::time;

    #[tokio::test]
    async fn without_options() {
        let frame = Frame::bulk_array(["SET", "key1", "1"]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: String::from("key1"),
                value: Bytes::from("1"),
                ..Default::default()
            })
        );

        let store = Store::new();

        let result = cmd.exec(store.clone()).await.unwrap();

        assert_eq!(result, Frame::Simple("OK".to_string()));
        assert_eq!(store.lock().get("key1"), Ok(Some(Bytes::from("1"))));
    }

    #[test]
    fn parse_options() {
        let frame = Frame::bulk_array(["SET", "key1", "1", "px", "100", "EX", "10"]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: String::from("key1"),
                value: Bytes::from("1"),
                px: Some(100),
                ex: Some(10),
                exat: None,
            })
        );
    }

    #[test]
    fn options_priority() {
        let set = Set {
            px: Some(100),
            ex: Some(10),
            exat: Some(1),
            ..Default::default()
        };
        assert_eq!(set.ttl(), Some(Duration::from_millis(100)));

        let set = Set {
            ex: Some(10),
            exat: Some(1),
            ..Default::default()
        };
        assert_eq!(set.ttl(), Some(Duration::from_secs(10)));

        let set = Set {
            exat: Some(1),
            ..Default::default()
        };
        assert_eq!(set.ttl(), Some(Duration::ZERO));

        assert_eq!(Set::default().ttl(), None);
    }

    #[test]
    fn invalid_options() {
        let cases = [
            (
                vec!["SET", "key1", "1", "KEEPTTL"],
                CommandParserError::Syntax,
            ),
            (vec!["SET", "key1", "1", "PX"], CommandParserError::Syntax),
            (
                vec!["SET", "key1", "1", "PX", "ten"],
                CommandParserError::InvalidInteger,
            ),
            (
                vec!["SET", "key1", "1", "EX", "0"],
                CommandParserError::InvalidExpireTime {
                    command: "set".to_string(),
                },
            ),
            (
                vec!["SET", "key1"],
                CommandParserError::WrongNumberOfArguments {
                    command: "set".to_string(),
                },
            ),
        ];

        for (parts, expected) in cases {
            let err = Command::try_from(Frame::bulk_array(parts)).unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_px() {
        let store = Store::new();

        let cmd = Command::try_from(Frame::bulk_array(["SET", "key1", "v", "PX", "100"])).unwrap();
        cmd.exec(store.clone()).await.unwrap();

        assert_eq!(store.lock().get("key1"), Ok(Some(Bytes::from("v"))));

        time::advance(Duration::from_millis(99)).await;
        assert_eq!(store.lock().get("key1"), Ok(Some(Bytes::from("v"))));

        time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.lock().get("key1"), Ok(None));
        assert!(!store.lock().exists("key1"));
    }

    #[tokio::test]
    async fn overwrites_list() {
        let store = Store::new();
        store
            .lock()
            .push("key1", vec![Bytes::from("a")], Side::Right)
            .unwrap();

        let cmd = Command::try_from(Frame::bulk_array(["SET", "key1", "v"])).unwrap();
        cmd.exec(store.clone()).await.unwrap();

        assert_eq!(store.lock().type_of("key1"), Some("string"));
    }
}

//! Replication role of the node and the replica side of the handshake with a master.
//!
//! Only the handshake is implemented: once the master accepted the `PSYNC`, everything it sends
//! is read and discarded.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use itertools::Itertools;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::Frame;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Master { replid: String, offset: u64 },
    Replica { master: ReplicaOf },
}

impl Role {
    /// A master with a fresh 40 character replication id.
    pub fn master() -> Role {
        let replid = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            .chars()
            .take(40)
            .collect();

        Role::Master { replid, offset: 0 }
    }

    /// The `# Replication` section of `INFO`.
    pub fn info(&self) -> String {
        let lines = match self {
            Role::Master { replid, offset } => vec![
                "role:master".to_string(),
                "connected_slaves:0".to_string(),
                format!("master_replid:{replid}"),
                format!("master_repl_offset:{offset}"),
            ],
            Role::Replica { master } => vec![
                "role:slave".to_string(),
                format!("master_host:{}", master.host),
                format!("master_port:{}", master.port),
            ],
        };

        format!("# Replication\r\n{}\r\n", lines.iter().join("\r\n"))
    }
}

/// Address of the master a replica follows, given as `"<host> <port>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ReplicaOfError {
    #[error("expected \"<host> <port>\", got {0:?}")]
    InvalidFormat(String),
    #[error("invalid master port {0:?}")]
    InvalidPort(String),
}

impl FromStr for ReplicaOf {
    type Err = ReplicaOfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ReplicaOfError::InvalidFormat(s.to_string()));
        };

        let port = port
            .parse()
            .map_err(|_| ReplicaOfError::InvalidPort(port.to_string()))?;

        Ok(ReplicaOf {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ReplicaOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connects to the master, performs the handshake and then drains the replication stream.
#[instrument(name = "replication", skip_all, fields(master = %master))]
pub async fn follow(master: ReplicaOf, listening_port: u16) -> Result<(), Error> {
    let stream = TcpStream::connect((master.host.as_str(), master.port)).await?;
    let mut framed = Framed::new(stream, FrameCodec::default());

    let port = listening_port.to_string();
    let handshake: [Vec<&str>; 4] = [
        vec!["PING"],
        vec!["REPLCONF", "listening-port", port.as_str()],
        vec!["REPLCONF", "capa", "psync2"],
        vec!["PSYNC", "?", "-1"],
    ];

    for command in handshake {
        let request =
            Frame::bulk_array(command.iter().map(|part| Bytes::copy_from_slice(part.as_bytes())));
        framed.send(request).await?;

        match framed.next().await {
            Some(Ok(Frame::Error(message))) => {
                return Err(format!("master rejected {}: {}", command[0], message).into())
            }
            Some(Ok(reply)) => debug!("master replied to {}: {}", command[0], reply),
            Some(Err(e)) => return Err(e.into()),
            None => return Err("master closed the connection during the handshake".into()),
        }
    }

    info!("handshake with master completed");

    // The snapshot and the command stream that follow are not applied.
    let mut stream = framed.into_inner();
    let mut buf = vec![0u8; 4096];
    let mut discarded = 0usize;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        discarded += n;
    }

    info!(discarded, "master closed the replication stream");
    Ok(())
}

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use crate::commands::CommandParserError;
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::{self, Frame};
use crate::replication::{self, Role};
use crate::session::Session;
use crate::store::Store;
use crate::Error;

pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;

    let role = match config.replicaof {
        Some(master) => {
            tokio::spawn({
                let master = master.clone();
                let port = config.port;
                async move {
                    if let Err(e) = replication::follow(master, port).await {
                        error!("Replication with master failed: {}", e);
                    }
                }
            });
            Role::Replica { master }
        }
        None => Role::master(),
    };

    serve(listener, Store::with_role(role)).await
}

/// Accepts connections on `listener` until it fails, serving each one from its own task.
pub async fn serve(listener: TcpListener, store: Store) -> Result<(), Error> {
    info!("Redis server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = listener.accept().await?;
        let store = store.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, store).await {
                error!("Connection failed: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, store),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    store: Store,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream, client_address);
    let mut session = Session::new(conn.id, store);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", conn.client_address.to_string());

    loop {
        let frames = match conn.read_batch().await {
            Ok(Some(frames)) => frames,
            Ok(None) => break,
            Err(frame::Error::Io(e)) => return Err(e.into()),
            Err(e) => {
                warn!("Protocol error: {}", e);
                conn.write_frame(&Frame::Error("ERR protocol error".to_string()))
                    .await?;
                break;
            }
        };
        debug!("Received {} frames from client", frames.len());

        // A blocked command is abandoned as soon as the client goes away. The batch is polled
        // first so commands that never suspend always run, even after the client half-closed.
        let (replies, fatal) = tokio::select! {
            biased;
            outcome = apply_batch(&mut session, frames) => outcome,
            closed = conn.closed() => {
                closed?;
                info!("Connection closed while a command was blocked");
                return Ok(());
            }
        };

        conn.write_all(&replies).await?;

        if let Some(e) = fatal {
            warn!("Closing connection: {}", e);
            conn.write_frame(&Frame::Error(e.to_string())).await?;
            break;
        }
    }

    info!("Connection closed");
    Ok(())
}

/// Applies frames in order and returns the serialized replies. Stops at the first error that
/// requires closing the connection, returning the replies produced before it.
async fn apply_batch(
    session: &mut Session,
    frames: Vec<Frame>,
) -> (Vec<u8>, Option<CommandParserError>) {
    let mut replies = Vec::new();

    for frame in frames {
        match session.apply(frame).await {
            Ok(reply) => {
                debug!("Sending response to client: {}", reply);
                replies.extend(reply.serialize());
            }
            Err(e) => return (replies, Some(e)),
        }
    }

    (replies, None)
}

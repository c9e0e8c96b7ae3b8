//! Connection handling logic for TCP clients.
//!
//! This module wires an accepted socket to its Connection actor: a reader
//! task turns bytes into protocol frames while the actor owns the write half.

use crate::{
    connection::{CommandReader, ConnectionActor, ConnectionContext, ConnectionId},
    error::ServerError,
};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Frames buffered between the reader task and the Connection actor.
const FRAME_BUFFER: usize = 16;

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Split the socket and spawn the frame reader
/// 2. Run the Connection actor until the player leaves, the socket drops or
///    the server shuts down
/// 3. Stop the reader and deregister the connection
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    context: ConnectionContext,
    max_message_size: usize,
) -> Result<(), ServerError> {
    stream
        .set_nodelay(true)
        .map_err(|e| ServerError::Network(format!("Failed to configure socket: {e}")))?;

    let (read_half, write_half) = stream.into_split();
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    let connection_manager = context.manager.clone();

    debug!("🔗 Connection {} serving {}", connection_id, addr);

    let reader_task = tokio::spawn(async move {
        let mut reader = CommandReader::new(read_half, max_message_size);
        loop {
            match reader.next_frame().await {
                Ok(Some(frame)) => {
                    if frames_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    trace!("📭 Connection {} reached end of stream", connection_id);
                    break;
                }
                Err(e) => {
                    debug!("🔌 Read error on connection {}: {}", connection_id, e);
                    break;
                }
            }
        }
    });

    ConnectionActor::new(connection_id, write_half, frames_rx, context)
        .run()
        .await;

    reader_task.abort();
    connection_manager.remove_connection(connection_id).await;
    Ok(())
}

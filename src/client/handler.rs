use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::handlers::parse_error_to_status;
use crate::middleware::logging::{log_disconnect, log_request};
use crate::protocol::handlers::write_status_body;
use crate::protocol::responses::ResponseHead;
use crate::protocol::{handle_request, read_request};
use crate::server::ServerContext;

/// Serves requests on one connection until the client leaves, a response
/// demands closing, or the connection sits idle past the configured timeout.
///
/// Nothing but the shared read-only context crosses requests. Every file
/// handle opened for a response is dropped before the next request is read.
pub async fn handle_client(stream: TcpStream, client_addr: SocketAddr, context: Arc<ServerContext>) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    let limits = context.limits();
    let idle = context.config.connection_timeout();
    let mut served_requests = 0;

    loop {
        let request = match timeout(idle, read_request(&mut reader, limits)).await {
            Err(_) => {
                debug!("Connection {} idle for {:?}, closing", client_addr, idle);
                break;
            }
            Ok(Ok(None)) => break,
            Ok(Ok(Some(request))) => request,
            Ok(Err(e)) => {
                warn!("Bad request from {}: {}", client_addr, e);
                if let Some(status) = parse_error_to_status(&e) {
                    let head = ResponseHead::new(status).header("Connection", "close");
                    let _ = write_status_body(&mut writer, head).await;
                }
                break;
            }
        };

        let served = match handle_request(&request, &context, &mut writer).await {
            Ok(served) => served,
            Err(e) => {
                debug!("Failed to write response to {}: {}", client_addr, e);
                break;
            }
        };
        served_requests += 1;
        log_request(&client_addr, &request, served.status, served.bytes);

        if served.close || !request.keep_alive() {
            break;
        }
    }

    let _ = writer.shutdown().await;
    log_disconnect(&client_addr, served_requests);
}

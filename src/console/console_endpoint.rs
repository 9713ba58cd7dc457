use super::messages::{self, DownstreamMessage, UpstreamMessage};
use crate::flip_control::{FlipState, SupervisorHandle};
use crate::{info, log, warn};
use std::io::ErrorKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Loopback TCP endpoint serving the CLI verbs against the running
/// supervisor. One frame per request, one frame per reply; connections are
/// cheap and short-lived.
pub struct ConsoleEndpoint {
    close_tx: Option<oneshot::Sender<()>>,
    local: std::net::SocketAddr,
}

impl ConsoleEndpoint {
    /// Binds the endpoint and spawns the accept loop. A bind failure is a
    /// resource error surfaced to the caller; the daemon must not come up
    /// half-constructed.
    pub async fn start(bind: &str, handle: SupervisorHandle) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(bind).await?;
        let local = listener.local_addr()?;
        info!("Console endpoint listening on {local}.");
        let (close_tx, mut close_rx) = oneshot::channel();
        tokio::spawn(async move {
            loop {
                let accept = tokio::select! {
                    accept = listener.accept() => accept,
                    _ = &mut close_rx => break,
                };
                match accept {
                    Ok((socket, _)) => {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ConsoleEndpoint::serve(socket, handle).await {
                                match e.kind() {
                                    ErrorKind::UnexpectedEof
                                    | ErrorKind::ConnectionReset
                                    | ErrorKind::ConnectionAborted => {}
                                    _ => warn!("Closing console connection: {e:?}."),
                                }
                            }
                        });
                    }
                    Err(e) => warn!("Console accept failed: {e}."),
                }
            }
        });
        Ok(Self { close_tx: Some(close_tx), local })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr { self.local }

    #[allow(clippy::cast_possible_truncation)]
    async fn serve(mut socket: TcpStream, handle: SupervisorHandle) -> Result<(), std::io::Error> {
        loop {
            let length = socket.read_u32().await?;
            if length > messages::FRAME_LIMIT {
                warn!("Oversized console frame ({length} bytes); dropping connection.");
                return Ok(());
            }
            let mut buffer = vec![0u8; length as usize];
            socket.read_exact(&mut buffer).await?;
            let request = match messages::decode::<UpstreamMessage>(&buffer) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Undecodable console frame: {e}.");
                    return Ok(());
                }
            };

            let mut stop_after = false;
            let reply = match request {
                UpstreamMessage::Status => DownstreamMessage::Ack,
                UpstreamMessage::State => {
                    DownstreamMessage::State(handle.current_state().as_raw())
                }
                UpstreamMessage::SetState(raw) => match FlipState::from_repr(raw) {
                    Some(target) => {
                        if handle.force_state(target).await {
                            DownstreamMessage::Ack
                        } else {
                            DownstreamMessage::Rejected(
                                "supervisor not accepting diagnostics".into(),
                            )
                        }
                    }
                    None => DownstreamMessage::Rejected(format!("unknown flip state {raw}")),
                },
                UpstreamMessage::Command(code) => match handle.inject_raw_command(code) {
                    Ok(()) => DownstreamMessage::Ack,
                    Err(e) => DownstreamMessage::Rejected(e.to_string()),
                },
                UpstreamMessage::Stop => {
                    stop_after = true;
                    DownstreamMessage::Ack
                }
            };

            let payload = match messages::encode(&reply) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Console reply encoding failed: {e}.");
                    return Ok(());
                }
            };
            socket.write_u32(payload.len() as u32).await?;
            socket.write_all(&payload).await?;

            if stop_after {
                log!("Stop requested via console.");
                handle.stop();
                return Ok(());
            }
        }
    }
}

impl Drop for ConsoleEndpoint {
    fn drop(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}

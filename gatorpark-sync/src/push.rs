//! WebSocket push channel.
//!
//! Every accepted connection becomes one hub observer. Each applied change is
//! written to the socket as a single JSON text frame holding the updated
//! garage. Nothing is expected back; incoming frames other than ping/close are
//! ignored. A closed or failed connection drops its observer, which
//! unsubscribes it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::BroadcastHub;
use crate::gateway::GatewayError;

pub struct PushServer {
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
}

impl PushServer {
    pub async fn bind(addr: &str, hub: Arc<BroadcastHub>) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self) -> Result<(), GatewayError> {
        log::info!("Push channel listening on ws://{}", self.local_addr()?);

        loop {
            let (stream, addr) = self.listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub).await {
                    log::error!("Push connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<BroadcastHub>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Subscribed before the handshake completes: once the client sees the
        // connection open, every later change is queued for it.
        let mut observer = hub.subscribe(addr.to_string());
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!(
            "Observer {} connected from {addr} ({} active)",
            observer.id(),
            hub.observer_count()
        );

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Push connection closed from {addr}");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Err(e)) => {
                            log::warn!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        Some(Ok(_)) => {
                            log::trace!("Ignoring inbound frame from {addr}");
                        }
                    }
                }

                event = observer.recv() => {
                    match event {
                        Some(event) => {
                            let frame = Message::Text(event.payload.to_string().into());
                            if let Err(e) = ws_sender.send(frame).await {
                                log::info!("Dropping observer {} at {addr}: {e}", observer.id());
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        let id = observer.id();
        hub.unsubscribe(observer);
        log::debug!("Observer {id} unsubscribed ({} active)", hub.observer_count());
        Ok(())
    }
}

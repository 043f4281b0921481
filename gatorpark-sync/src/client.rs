//! Client side of the boundary protocol.
//!
//! Provides:
//! - `GET /garages` and `POST /garages/{name}/{action}` over reqwest
//! - a lazy, never-ending stream of [`PushEvent`]s from the WebSocket push
//!   channel, which falls back to polling the read endpoint while the push
//!   channel is down and reconnects on its own
//!
//! Dropping the stream closes the socket; there is no separate cancel call.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::{StatusCode, Url};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gatorpark_core::{Action, Garage, Mutation};

use crate::protocol::{decode_garage, decode_outcome, decode_snapshot, ProtocolError, OUTCOME_HEADER};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the HTTP API, e.g. `http://127.0.0.1:3000`
    pub base_url: String,
    /// URL of the push channel, e.g. `ws://127.0.0.1:3001`
    pub push_url: String,
    /// Delay between fallback polls while the push channel is down
    pub poll_interval: Duration,
    /// Per-request timeout for HTTP calls
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            push_url: "ws://127.0.0.1:3001".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Garage not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    BadRequest(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Something that happened on the update stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Push channel (re)connected.
    Connected,
    /// One applied change, straight from the server. Frames queued while the
    /// snapshot was fetched may predate the `Resync` before them; their lower
    /// `revision` tells them apart.
    Update(Garage),
    /// A fresh full snapshot, sent after each (re)connect and while polling.
    Resync(Vec<Garage>),
    /// Push channel lost; polling until it comes back.
    Disconnected,
    /// A frame that failed strict decoding.
    Malformed(String),
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where the update stream is in its connect/sync/poll cycle.
enum Phase {
    Connect { offline: bool },
    Sync(WsStream),
    Live(WsStream),
    Poll,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct GarageClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl GarageClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Full current list of garages.
    pub async fn fetch_garages(&self) -> Result<Vec<Garage>, ClientError> {
        let url = self.url(&["garages"])?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(decode_snapshot(&bytes)?)
    }

    pub async fn check_in(&self, name: &str) -> Result<Mutation, ClientError> {
        self.mutate(name, Action::CheckIn).await
    }

    pub async fn check_out(&self, name: &str) -> Result<Mutation, ClientError> {
        self.mutate(name, Action::CheckOut).await
    }

    /// Send one action; the reply carries the authoritative garage and its tag.
    pub async fn mutate(&self, name: &str, action: Action) -> Result<Mutation, ClientError> {
        let url = self.url(&["garages", name, action.as_str()])?;
        let response = self.http.post(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ClientError::NotFound(name.to_string())),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::BadRequest(body));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let header = response
            .headers()
            .get(OUTCOME_HEADER)
            .map(|v| v.to_str().unwrap_or_default().to_string());
        let tag = decode_outcome(header.as_deref())?;
        let bytes = response.bytes().await?;
        let garage = decode_garage(&bytes)?;
        Ok(Mutation { garage, tag })
    }

    /// Lazy, unbounded stream of push events.
    ///
    /// Nothing connects until the stream is first polled. Stop polling or
    /// drop the stream to cancel.
    pub fn updates(&self) -> impl Stream<Item = PushEvent> + Send + 'static {
        let client = self.clone();
        futures_util::stream::unfold(
            (client, Phase::Connect { offline: false }),
            |(client, mut phase)| async move {
                loop {
                    let (event, next) = client.step(phase).await;
                    phase = next;
                    if let Some(event) = event {
                        return Some((event, (client, phase)));
                    }
                }
            },
        )
    }

    async fn step(&self, phase: Phase) -> (Option<PushEvent>, Phase) {
        match phase {
            Phase::Connect { offline } => {
                match tokio_tungstenite::connect_async(self.config.push_url.as_str()).await {
                    Ok((ws, _)) => {
                        log::info!("Push channel connected to {}", self.config.push_url);
                        (Some(PushEvent::Connected), Phase::Sync(ws))
                    }
                    Err(e) => {
                        log::debug!("Push connect to {} failed: {e}", self.config.push_url);
                        if offline {
                            (None, Phase::Poll)
                        } else {
                            log::warn!("Push channel unavailable, polling {}", self.config.base_url);
                            (Some(PushEvent::Disconnected), Phase::Poll)
                        }
                    }
                }
            }

            // Anything applied before the socket opened is only visible in a
            // fresh snapshot.
            Phase::Sync(ws) => match self.fetch_garages().await {
                Ok(garages) => (Some(PushEvent::Resync(garages)), Phase::Live(ws)),
                Err(e) => {
                    log::warn!("Snapshot after connect failed: {e}");
                    (None, Phase::Live(ws))
                }
            },

            Phase::Live(mut ws) => match ws.next().await {
                Some(Ok(Message::Text(text))) => (Some(decode_frame(text.as_bytes())), Phase::Live(ws)),
                Some(Ok(Message::Binary(data))) => (Some(decode_frame(&data)), Phase::Live(ws)),
                Some(Ok(Message::Close(_))) | None => {
                    log::warn!("Push channel closed by server");
                    (Some(PushEvent::Disconnected), Phase::Poll)
                }
                Some(Err(e)) => {
                    log::warn!("Push channel error: {e}");
                    (Some(PushEvent::Disconnected), Phase::Poll)
                }
                Some(Ok(_)) => (None, Phase::Live(ws)),
            },

            Phase::Poll => match self.fetch_garages().await {
                Ok(garages) => (Some(PushEvent::Resync(garages)), Phase::Backoff),
                Err(e) => {
                    log::debug!("Fallback poll failed: {e}");
                    (None, Phase::Backoff)
                }
            },

            Phase::Backoff => {
                tokio::time::sleep(self.config.poll_interval).await;
                (None, Phase::Connect { offline: true })
            }
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.config.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn decode_frame(bytes: &[u8]) -> PushEvent {
    match decode_garage(bytes) {
        Ok(garage) => PushEvent::Update(garage),
        Err(e) => {
            log::warn!("Malformed push payload: {e}");
            PushEvent::Malformed(e.to_string())
        }
    }
}

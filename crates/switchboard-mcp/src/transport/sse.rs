//! SSE transport: a remote HTTP endpoint with a server-sent event stream for
//! responses and HTTP POST for outbound messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use switchboard_core::{Result, SwitchboardError};

use super::{resolve_config_value, Transport};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const RESPONSE_CHANNEL_CAPACITY: usize = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SseTransport {
    server: String,
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
    response_rx: mpsc::Receiver<JsonRpcResponse>,
    alive: Arc<AtomicBool>,
    // Discovered from the stream's `endpoint` event; until then POSTs fall
    // back to `<url>/messages`.
    messages_url: Arc<RwLock<Option<String>>>,
    listener: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("server", &self.server)
            .field("url", &self.url)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

impl SseTransport {
    /// Open the event stream and start the listener task.
    pub async fn open(server: &str, url: &str, headers: &HashMap<String, String>) -> Result<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SwitchboardError::ConnectError {
                server: server.to_string(),
                message: format!("remote url must start with http:// or https://, got '{url}'"),
            });
        }
        info!(server, url, "opening SSE session to MCP server");

        let mut default_headers = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let resolved = resolve_config_value(value);
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                SwitchboardError::ConnectError {
                    server: server.to_string(),
                    message: format!("invalid header name '{key}': {e}"),
                }
            })?;
            let header_value = reqwest::header::HeaderValue::from_str(&resolved).map_err(|e| {
                SwitchboardError::ConnectError {
                    server: server.to_string(),
                    message: format!("invalid header value for '{key}': {e}"),
                }
            })?;
            default_headers.insert(name, header_value);
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(default_headers)
            .build()
            .map_err(|e| SwitchboardError::ConnectError {
                server: server.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let sse_url = if url.ends_with("/sse") {
            url.to_string()
        } else {
            format!("{}/sse", url.trim_end_matches('/'))
        };

        let (response_tx, response_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(false));
        let messages_url = Arc::new(RwLock::new(None::<String>));

        let listener_alive = alive.clone();
        let listener_messages_url = messages_url.clone();
        let listener_server = server.to_string();
        let base_url = url.trim_end_matches('/').to_string();
        let request_builder = client.get(&sse_url);

        let listener = tokio::spawn(async move {
            let mut stream = match EventSource::new(request_builder) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(server = %listener_server, "failed to open event stream: {e}");
                    return;
                }
            };

            while let Some(event) = stream.next().await {
                match event {
                    Ok(Event::Open) => {
                        info!(server = %listener_server, "SSE stream open");
                        listener_alive.store(true, Ordering::SeqCst);
                    }
                    Ok(Event::Message(message)) => {
                        if message.event == "endpoint" {
                            let endpoint = format!("{base_url}{}", message.data);
                            debug!(server = %listener_server, "messages endpoint: {endpoint}");
                            *listener_messages_url.write().await = Some(endpoint);
                        } else if message.event == "message" || message.event.is_empty() {
                            match serde_json::from_str::<JsonRpcResponse>(&message.data) {
                                Ok(response) => {
                                    if response_tx.send(response).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!(server = %listener_server, "unparseable event: {e}");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!(server = %listener_server, "SSE stream error: {e}");
                        listener_alive.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            listener_alive.store(false, Ordering::SeqCst);
        });

        // Give the stream a moment to open and discover the messages endpoint
        // before the handshake starts posting.
        tokio::time::sleep(Duration::from_millis(300)).await;

        Ok(Self {
            server: server.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            client,
            response_rx,
            alive,
            messages_url,
            listener: Some(listener),
        })
    }

    async fn post_message(&self, json: String) -> Result<()> {
        let messages_url = match self.messages_url.read().await.clone() {
            Some(url) => url,
            None => format!("{}/messages", self.url.trim_end_matches('/')),
        };
        debug!(server = %self.server, "-> {messages_url}: {json}");

        let mut request = self
            .client
            .post(&messages_url)
            .header("Content-Type", "application/json");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), resolve_config_value(value));
        }

        let response =
            request
                .body(json)
                .send()
                .await
                .map_err(|e| SwitchboardError::RemoteError {
                    server: self.server.clone(),
                    message: format!("failed to POST message: {e}"),
                })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwitchboardError::RemoteError {
                server: self.server.clone(),
                message: format!("message POST returned {status}: {body}"),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()> {
        let json = serde_json::to_string(&request)?;
        self.post_message(json).await
    }

    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()> {
        let json = serde_json::to_string(&notification)?;
        self.post_message(json).await
    }

    async fn try_receive(&mut self) -> Result<Option<JsonRpcResponse>> {
        match self.response_rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SwitchboardError::RemoteError {
                server: self.server.clone(),
                message: "event stream closed".to_string(),
            }),
        }
    }

    async fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.alive.store(false, Ordering::SeqCst);
        info!(server = %self.server, "SSE session closed");
        Ok(())
    }
}

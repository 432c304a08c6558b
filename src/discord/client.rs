use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use super::endpoint::{self, IpcStream};
use super::ipc::{read_frame, write_frame, IpcError, Opcode};
use crate::config::AppConfig;
use crate::presence::{
    Activity, ConnectionState, PresenceTransport, TransportError, TransportFactory,
};

const RPC_VERSION: u32 = 1;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct ClientSettings {
    client_id: String,
    connection_timeout: Duration,
    response_timeout: Duration,
    search_dirs: Arc<[PathBuf]>,
}

/// Builds Discord IPC clients for a given pipe slot
#[derive(Debug, Clone)]
pub struct DiscordIpcFactory {
    settings: ClientSettings,
}

impl DiscordIpcFactory {
    pub fn new(client_id: String, connection_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            settings: ClientSettings {
                client_id,
                connection_timeout,
                response_timeout,
                search_dirs: endpoint::default_search_dirs().into(),
            },
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.discord_client_id.clone(),
            config.discord_connection_timeout,
            config.discord_response_timeout,
        )
    }

    /// Overrides where unix sockets are looked up
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.settings.search_dirs = dirs.into();
        self
    }
}

impl TransportFactory for DiscordIpcFactory {
    fn create(&self, slot: u8) -> Box<dyn PresenceTransport> {
        Box::new(DiscordIpcClient {
            settings: self.settings.clone(),
            slot,
            stream: None,
            state: ConnectionState::Disconnected,
        })
    }
}

/// One IPC session with the Discord desktop client
pub struct DiscordIpcClient {
    settings: ClientSettings,
    slot: u8,
    stream: Option<Box<dyn IpcStream>>,
    state: ConnectionState,
}

impl DiscordIpcClient {
    async fn open_and_handshake(&mut self) -> Result<Box<dyn IpcStream>, TransportError> {
        let (slot, path) = endpoint::locate(&self.settings.search_dirs, self.slot)
            .ok_or(TransportError::NotFound)?;
        self.slot = slot;

        tracing::debug!("Opening Discord IPC endpoint {}", path.display());
        let mut stream = tokio::time::timeout(self.settings.connection_timeout, endpoint::open(&path))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(IpcError::from)?;

        write_frame(
            &mut stream,
            Opcode::Handshake,
            &json!({ "v": RPC_VERSION, "client_id": self.settings.client_id }),
        )
        .await?;

        let deadline = Instant::now() + self.settings.response_timeout;
        loop {
            let (opcode, body) = tokio::time::timeout_at(deadline, read_frame(&mut stream))
                .await
                .map_err(|_| TransportError::Timeout)??;

            match opcode {
                Opcode::Frame if body["evt"] == "READY" => {
                    if let Some(user) = body["data"]["user"]["username"].as_str() {
                        tracing::debug!("Discord RPC ready for user {}", user);
                    }
                    return Ok(stream);
                }
                Opcode::Frame if body["evt"] == "ERROR" => return Err(rejected(&body["data"])),
                Opcode::Close => return Err(rejected(&body)),
                Opcode::Ping => write_frame(&mut stream, Opcode::Pong, &body).await?,
                _ => tracing::debug!("Ignoring {:?} frame during handshake", opcode),
            }
        }
    }

    /// Sends a command and waits for the reply carrying the same nonce.
    async fn exchange(&mut self, command: &str, args: Value) -> Result<Value, TransportError> {
        let response_timeout = self.settings.response_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        let nonce = uuid::Uuid::new_v4().to_string();
        let request = json!({ "cmd": command, "args": args, "nonce": nonce });
        write_frame(&mut *stream, Opcode::Frame, &request).await?;

        let deadline = Instant::now() + response_timeout;
        loop {
            let (opcode, body) = tokio::time::timeout_at(deadline, read_frame(&mut *stream))
                .await
                .map_err(|_| TransportError::Timeout)??;

            match opcode {
                Opcode::Frame if body["nonce"] == nonce.as_str() => {
                    if body["evt"] == "ERROR" {
                        return Err(rejected(&body["data"]));
                    }
                    return Ok(body);
                }
                Opcode::Close => return Err(TransportError::Closed),
                Opcode::Ping => write_frame(&mut *stream, Opcode::Pong, &body).await?,
                _ => tracing::debug!("Ignoring unrelated {:?} frame", opcode),
            }
        }
    }
}

fn rejected(data: &Value) -> TransportError {
    TransportError::Rejected {
        code: data["code"].as_i64().unwrap_or_default(),
        message: data["message"].as_str().unwrap_or("unknown error").to_string(),
    }
}

#[async_trait]
impl PresenceTransport for DiscordIpcClient {
    fn slot(&self) -> u8 {
        self.slot
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.open_and_handshake().await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn update(&mut self, activity: &Activity) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::Closed);
        }

        let activity = serde_json::to_value(activity).map_err(IpcError::from)?;
        let args = json!({ "pid": std::process::id(), "activity": activity });

        match self.exchange("SET_ACTIVITY", args).await {
            Ok(_) => Ok(()),
            Err(TransportError::Closed) => {
                self.stream = None;
                self.state = ConnectionState::Disconnected;
                Err(TransportError::Closed)
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let goodbye = json!({ "v": RPC_VERSION, "client_id": self.settings.client_id });
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                let _ = write_frame(&mut stream, Opcode::Close, &goodbye).await;
                let _ = stream.shutdown().await;
            })
            .await;
        }
        self.state = ConnectionState::Closed;
    }
}

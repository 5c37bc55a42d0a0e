//! Duplex transports that carry JSON-RPC texts to a language server.
//!
//! A [`Connector`] produces one [`Duplex`] per `(workspace, language)`
//! connection. Messages cross the duplex as whole JSON texts; framing, if
//! the underlying medium needs any, is the connector's business.
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::codec::{frame_message, read_frame};
use crate::error::LspError;

/// Capacity of each direction of a duplex channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// What a connector needs to know to reach a server.
#[derive(Clone)]
pub struct ConnectParams {
    pub workspace_id: String,
    pub language_id: String,
    /// Workspace folder URI sent as `rootUri`.
    pub root_uri: String,
    /// Opaque bearer token for authenticated transports.
    pub token: Option<String>,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("workspace_id", &self.workspace_id)
            .field("language_id", &self.language_id)
            .field("root_uri", &self.root_uri)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Client side of an established channel.
///
/// Dropping `outbound` closes the channel; `inbound` ending means the
/// server went away.
#[derive(Debug)]
pub struct Duplex {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens duplex channels to language servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether a server can be reached for `language_id` at all.
    fn supports(&self, _language_id: &str) -> bool {
        true
    }

    async fn connect(&self, params: &ConnectParams) -> Result<Duplex, LspError>;
}

/// Command line used to launch a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub command: String,
    pub args: Vec<String>,
}

/// Launches one child process per connection and speaks
/// `Content-Length` framed JSON-RPC over its stdin/stdout.
#[derive(Debug, Clone, Default)]
pub struct StdioConnector {
    servers: HashMap<String, ServerCommand>,
}

impl StdioConnector {
    /// A connector with no servers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the command for a language, replacing any previous one.
    pub fn with_server(
        mut self,
        language_id: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        self.servers.insert(
            language_id.into(),
            ServerCommand {
                command: command.into(),
                args,
            },
        );
        self
    }

    /// The command registered for `language_id`.
    pub fn server(&self, language_id: &str) -> Option<&ServerCommand> {
        self.servers.get(language_id)
    }
}

#[async_trait]
impl Connector for StdioConnector {
    fn supports(&self, language_id: &str) -> bool {
        self.servers.contains_key(language_id)
    }

    async fn connect(&self, params: &ConnectParams) -> Result<Duplex, LspError> {
        let server = self
            .servers
            .get(&params.language_id)
            .ok_or_else(|| LspError::NoServer(params.language_id.clone()))?;

        let mut command = Command::new(&server.command);
        command
            .args(&server.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = params.root_uri.strip_prefix("file://") {
            if Path::new(dir).is_dir() {
                command.current_dir(dir);
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| LspError::SpawnFailed(format!("{}: {}", server.command, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdout".into()))?;

        tracing::info!(
            language = %params.language_id,
            command = %server.command,
            pid = ?child.id(),
            "spawned language server"
        );

        let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        // Writer: owns the child, so the process goes away with the channel.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(body) = out_rx.recv().await {
                if stdin.write_all(&frame_message(&body)).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
            drop(stdin);
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "language server already exited");
            }
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(body)) => {
                        if in_tx.send(body).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "language server stream failed");
                        break;
                    }
                }
            }
        });

        Ok(Duplex {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Server side of an in-process duplex.
#[derive(Debug)]
pub struct ServerEnd {
    pub params: ConnectParams,
    /// Messages sent by the client.
    pub inbound: mpsc::Receiver<String>,
    /// Messages to deliver to the client.
    pub outbound: mpsc::Sender<String>,
}

/// Hands each connection's server end to a receiver in the same process.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    servers: mpsc::UnboundedSender<ServerEnd>,
    /// Empty means every language.
    languages: Vec<String>,
}

impl MemoryConnector {
    /// A connector plus the receiver its server ends arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                servers: tx,
                languages: Vec::new(),
            },
            rx,
        )
    }

    /// Serve only the given languages.
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn supports(&self, language_id: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language_id)
    }

    async fn connect(&self, params: &ConnectParams) -> Result<Duplex, LspError> {
        if !self.supports(&params.language_id) {
            return Err(LspError::NoServer(params.language_id.clone()));
        }
        let (client_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_tx, client_rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.servers
            .send(ServerEnd {
                params: params.clone(),
                inbound: server_rx,
                outbound: server_tx,
            })
            .map_err(|_| LspError::SpawnFailed("in-process server is gone".into()))?;
        Ok(Duplex {
            outbound: client_tx,
            inbound: client_rx,
        })
    }
}

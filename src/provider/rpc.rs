//! Provider RPC wire contract (spec §6). Transport is local TCP; each
//! request/response is one newline-delimited JSON object — a minimal framing
//! chosen over a full JSON-RPC 2.0 envelope because the spec only requires a
//! handful of fixed methods between two trusted local processes, not
//! multiplexed/out-of-order dispatch.
//!
//! Handshake: the spawned provider process prints exactly one line
//! `PROVIDER_PORT=<port>` to stdout, then flushes, before the RPC connection
//! is opened.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::ProviderError;

pub const PORT_LINE_PREFIX: &str = "PROVIDER_PORT=";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    Init { alias: String, config: serde_json::Value, source_file_path: String },
    Fetch { path: Vec<String> },
    Info,
    Health,
    Shutdown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok { result: serde_json::Value },
    /// Distinguished "not found" status, separate from a generic failure
    /// (spec §6: "A `not found` condition returns a specific status code
    /// distinct from generic failure").
    NotFound { message: String },
    Error { message: String },
}

pub struct RpcConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RpcConnection {
    pub fn new(stream: tokio::net::TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self { reader: BufReader::new(read_half), writer: write_half }
    }

    pub async fn call(&mut self, alias: &str, request: &Request) -> Result<Response, ProviderError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| ProviderError::Rpc { alias: alias.to_string(), message: e.to_string() })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.map_err(|e| ProviderError::Rpc {
            alias: alias.to_string(),
            message: e.to_string(),
        })?;
        self.writer.flush().await.map_err(|e| ProviderError::Rpc { alias: alias.to_string(), message: e.to_string() })?;

        let mut response_line = String::new();
        let n = self.reader.read_line(&mut response_line).await.map_err(|e| ProviderError::Rpc {
            alias: alias.to_string(),
            message: e.to_string(),
        })?;
        if n == 0 {
            return Err(ProviderError::Rpc { alias: alias.to_string(), message: "connection closed".into() });
        }
        serde_json::from_str(response_line.trim_end())
            .map_err(|e| ProviderError::Rpc { alias: alias.to_string(), message: e.to_string() })
    }
}

/// Reads stdout lines from a newly spawned provider process until it prints
/// `PROVIDER_PORT=<port>`, per the handshake in spec §4.6 step 4. Any other
/// early stdout is discarded.
pub async fn read_announced_port<R>(mut lines: tokio::io::Lines<BufReader<R>>) -> Option<u16>
where
    R: tokio::io::AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(rest) = line.strip_prefix(PORT_LINE_PREFIX) {
            if let Ok(port) = rest.trim().parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

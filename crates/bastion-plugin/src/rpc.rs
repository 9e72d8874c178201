// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-delimited JSON request/response client for out-of-process plugins.
//!
//! Each request is one line `{"id": n, "method": "...", "params": ...}`.
//! The plugin answers with one line `{"id": n, "result": ...}` or
//! `{"id": n, "error": {"code": "...", "message": "..."}}`. Calls are
//! serialized: one request is outstanding at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bastion_core::{AdapterError, BastionError, ErrorCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct Request<'a, P> {
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<WireError>,
}

/// Error payload. `retryable` falls back to the code's classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<WireError> for AdapterError {
    fn from(wire: WireError) -> Self {
        let retryable = wire.retryable.unwrap_or_else(|| wire.code.is_retryable());
        let err = AdapterError::new(wire.code, wire.message, retryable);
        match wire.retry_after_secs {
            Some(secs) => err.with_retry_after(Duration::from_secs(secs)),
            None => err,
        }
    }
}

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

struct Channel {
    reader: Reader,
    writer: Writer,
}

/// Client half of the plugin RPC channel.
pub struct RpcClient {
    channel: Mutex<Channel>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl RpcClient {
    /// Wrap a reader (plugin stdout) and writer (plugin stdin).
    pub fn new<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            channel: Mutex::new(Channel {
                reader: BufReader::new(Box::new(reader)),
                writer: BufWriter::new(Box::new(writer)),
            }),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// A plugin-reported error comes back as [`BastionError::Adapter`]. A
    /// closed pipe in either direction is a retryable network error. Exceeding the call timeout
    /// is [`BastionError::Timeout`].
    pub async fn call<P, T>(&self, method: &str, params: P) -> Result<T, BastionError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Request { id, method, params })?;
        line.push('\n');

        let mut channel = self.channel.lock().await;
        let exchange = async {
            let sent = async {
                channel.writer.write_all(line.as_bytes()).await?;
                channel.writer.flush().await
            };
            sent.await.map_err(|e| {
                AdapterError::classified(ErrorCode::Network, format!("plugin closed its input: {e}"))
            })?;
            read_response(&mut channel.reader, id, method).await
        };
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BastionError::Timeout {
                duration: self.timeout,
            })??;

        if let Some(error) = response.error {
            return Err(BastionError::Adapter(error.into()));
        }
        Ok(serde_json::from_value(response.result)?)
    }
}

async fn read_response(
    reader: &mut Reader,
    id: u64,
    method: &str,
) -> Result<Response, BastionError> {
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf).await? == 0 {
            return Err(AdapterError::classified(
                ErrorCode::Network,
                "plugin closed its output",
            )
            .into());
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response: Response = serde_json::from_str(trimmed)?;
        if response.id == id {
            return Ok(response);
        }
        tracing::warn!(method, expected = id, got = response.id, "discarding stale plugin response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    /// Serve `replies` in order, one per request line, on the far end of a duplex pipe.
    fn client_with_replies(replies: Vec<Value>) -> (RpcClient, tokio::task::JoinHandle<Vec<Value>>) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let mut seen = Vec::new();
            for reply in replies {
                let Some(line) = lines.next_line().await.unwrap() else {
                    break;
                };
                seen.push(serde_json::from_str::<Value>(&line).unwrap());
                let mut out = reply.to_string();
                out.push('\n');
                server_write.write_all(out.as_bytes()).await.unwrap();
            }
            seen
        });
        (
            RpcClient::new(client_read, client_write, Duration::from_secs(5)),
            server,
        )
    }

    #[tokio::test]
    async fn call_round_trips_result() {
        let (client, server) = client_with_replies(vec![json!({"id": 1, "result": {"ok": true}})]);
        let result: Value = client.call("health", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));

        let seen = server.await.unwrap();
        assert_eq!(seen[0]["method"], "health");
        assert_eq!(seen[0]["id"], 1);
    }

    #[tokio::test]
    async fn null_result_decodes_as_unit() {
        let (client, _server) = client_with_replies(vec![json!({"id": 1, "result": null})]);
        let () = client.call("start", ()).await.unwrap();
    }

    #[tokio::test]
    async fn error_reply_becomes_adapter_error() {
        let (client, _server) = client_with_replies(vec![json!({
            "id": 1,
            "error": {"code": "rate_limited", "message": "slow down", "retry_after_secs": 3}
        })]);
        let err = client.call::<_, Value>("send_message", json!({})).await.unwrap_err();
        match err {
            BastionError::Adapter(e) => {
                assert_eq!(e.code, ErrorCode::RateLimited);
                assert!(e.retryable);
                assert_eq!(e.retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stale_responses_are_skipped() {
        let (client, _server) = client_with_replies(vec![json!({"id": 7, "result": 1})]);
        // The only reply has the wrong id; the server then stops and the pipe closes.
        let err = client.call::<_, Value>("health", ()).await.unwrap_err();
        assert!(matches!(err, BastionError::Adapter(ref e) if e.code == ErrorCode::Network));
    }

    #[tokio::test]
    async fn closed_pipe_is_network_error() {
        let (client, _server) = client_with_replies(vec![]);
        let err = client.call::<_, Value>("health", ()).await.unwrap_err();
        assert!(matches!(err, BastionError::Adapter(ref e) if e.code == ErrorCode::Network));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_plugin_times_out() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(client_io);
        let client = RpcClient::new(read, write, Duration::from_millis(200));
        let err = client.call::<_, Value>("health", ()).await.unwrap_err();
        assert!(matches!(err, BastionError::Timeout { .. }));
    }
}

//! bitcoind-style JSON-RPC 1.0 over HTTP POST.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::GatewayError;

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<NodeError>,
}

#[derive(Debug, Deserialize)]
struct NodeError {
    code: i64,
    message: String,
}

pub(crate) struct RpcClient {
    http: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub(crate) fn new(
        url: String,
        username: Option<String>,
        password: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                op: "connect",
                detail: e.to_string(),
            })?;
        Ok(RpcClient {
            http,
            url,
            username,
            password,
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Call `method`; `Ok(None)` when the node answers with a null result.
    ///
    /// Node-side failures come back as [`GatewayError::Node`] with the node's
    /// code and message intact.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        op: &'static str,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, url = %self.url, "gateway rpc call");

        let body = Request {
            jsonrpc: "1.0",
            id,
            method,
            params,
        };
        let mut request = self.http.post(&self.url).json(&body);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let unavailable = |detail: String| GatewayError::Unavailable { op, detail };
        let response = request.send().await.map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;

        // bitcoind reports RPC errors with a non-2xx status and a JSON body.
        let parsed: Response<T> = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(unavailable(format!("HTTP {status}"))),
            Err(e) => {
                return Err(GatewayError::InvalidResponse {
                    op,
                    detail: e.to_string(),
                })
            }
        };
        if let Some(err) = parsed.error {
            debug!(id, method, code = err.code, message = %err.message, "gateway rpc error");
            return Err(GatewayError::Node {
                op,
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result)
    }
}

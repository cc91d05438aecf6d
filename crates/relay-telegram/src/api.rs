//! Minimal Bot API client: JSON POST per method, `{ok, result, error_code, description}` envelope.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use relay_core::{config::ProxyConfig, errors::Error, utils::preview, Result};

#[derive(Clone, Debug)]
pub struct BotApiConfig {
    pub base_url: String,
    pub token: String,
    pub proxy: ProxyConfig,
    pub request_timeout: Duration,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BotApi {
    http: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
}

impl BotApi {
    /// Builds the HTTP client. All calls from this client go through the proxy when enabled.
    pub fn new(cfg: &BotApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")));

        if let Some(url) = cfg.proxy.proxy_url() {
            let proxy = reqwest::Proxy::all(&url)
                .map_err(|e| Error::Config(format!("invalid proxy url {url}: {e}")))?;
            builder = builder.proxy(proxy);
            tracing::info!(proxy = %url, "routing Telegram calls through proxy");
        }

        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", cfg.base_url.trim_end_matches('/'), cfg.token),
            request_timeout: cfg.request_timeout,
        })
    }

    /// Call `method` with a JSON payload.
    pub async fn call<P, R>(&self, method: &str, payload: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_timeout(method, payload, self.request_timeout)
            .await
    }

    /// Like `call`, for long-poll methods whose server-side wait adds to the request time.
    pub async fn call_with_timeout<P, R>(
        &self,
        method: &str,
        payload: &P,
        timeout: Duration,
    ) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(method, e))?;

        let envelope: Envelope<R> = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) if status.is_success() => {
                return Err(Error::Remote {
                    code: i64::from(status.as_u16()),
                    description: format!("{method}: undecodable response: {e}"),
                })
            }
            Err(_) => {
                return Err(Error::Remote {
                    code: i64::from(status.as_u16()),
                    description: preview(&body, 200),
                })
            }
        };

        if !envelope.ok {
            return Err(Error::Remote {
                code: envelope
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
            });
        }

        envelope.result.ok_or_else(|| Error::Remote {
            code: i64::from(status.as_u16()),
            description: format!("{method}: response without result"),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// `getMe`, used for the startup banner.
    pub async fn get_me(&self) -> Result<serde_json::Value> {
        self.call("getMe", &serde_json::json!({})).await
    }
}

fn transport_error(method: &str, e: reqwest::Error) -> Error {
    Error::Transport(format!("{method}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn api_for(base_url: String) -> BotApi {
        BotApi::new(&BotApiConfig {
            base_url,
            token: "test-token".to_string(),
            proxy: ProxyConfig::default(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn ok_envelope_yields_result() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(POST).path("/bottest-token/getMe");
                then.status(200)
                    .json_body(json!({"ok": true, "result": {"username": "relay_bot"}}));
            })
            .await;

        let me = api_for(server.base_url()).get_me().await.unwrap();
        assert_eq!(me["username"], "relay_bot");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_call_maps_to_remote_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bottest-token/sendMessage");
                then.status(400).json_body(json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: chat not found"
                }));
            })
            .await;

        let err = api_for(server.base_url())
            .call::<_, serde_json::Value>("sendMessage", &json!({"chat_id": 1, "text": "x"}))
            .await
            .unwrap_err();

        match err {
            Error::Remote { code, description } => {
                assert_eq!(code, 400);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_keeps_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bottest-token/getMe");
                then.status(502).body("<html>bad gateway</html>");
            })
            .await;

        let err = api_for(server.base_url()).get_me().await.unwrap_err();
        assert!(matches!(err, Error::Remote { code: 502, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Nothing listens on port 1.
        let err = api_for("http://127.0.0.1:1".to_string())
            .get_me()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn dead_proxy_is_transport_error() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(POST).path("/bottest-token/getMe");
                then.status(200).json_body(json!({"ok": true, "result": {}}));
            })
            .await;

        let api = BotApi::new(&BotApiConfig {
            base_url: server.base_url(),
            token: "test-token".to_string(),
            proxy: ProxyConfig::socks5("127.0.0.1:1"),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();

        let err = api.get_me().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {err:?}");
        assert_eq!(m.hits_async().await, 0);
    }
}

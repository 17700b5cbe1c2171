//! HTTP gateway client with timeout and error classification.
//!
//! # Responsibilities
//! - Submit transactions, poll their status, run read-only queries
//! - Carry the submitter's identity as request headers
//! - Map transport and HTTP failures onto [`GatewayErrorKind`]
//!
//! # Wire format
//! Every response is wrapped as `{success, data, error: {code, message}}`.
//! Identity headers are form-urlencoded because PEM material contains
//! newlines, which are not valid in header values.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::client::GatewayClient;
use crate::gateway::types::{
    Credentials, GatewayError, GatewayErrorKind, GatewayResult, GatewayTransactionRequest,
    GatewayTransactionResponse, TransientData,
};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const USER_CERT_HEADER: &str = "X-User-Cert";
pub const USER_KEY_HEADER: &str = "X-User-Key";
pub const USER_MSP_HEADER: &str = "X-User-MSPID";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    channel_name: &'a str,
    chaincode_name: &'a str,
    function_name: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    args: &'a [String],
    #[serde(skip_serializing_if = "TransientData::is_empty")]
    transient_data: &'a TransientData,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    function: &'a str,
    args: &'a [String],
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Gateway client speaking the gateway's REST API.
#[derive(Clone)]
pub struct HttpGatewayClient {
    base_url: Url,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::new(
                GatewayErrorKind::Protocol,
                format!("invalid gateway URL '{}': {}", config.base_url, e),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::new(
                GatewayErrorKind::Protocol,
                format!("gateway URL '{}' cannot be a base", config.base_url),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorKind::Internal, e.to_string()))?;

        tracing::info!(
            base_url = %base_url,
            timeout_secs = config.request_timeout_secs,
            "Gateway client initialized"
        );

        Ok(Self {
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> GatewayResult<(StatusCode, Vec<u8>)> {
        let response: Response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;
        Ok((status, body.to_vec()))
    }
}

impl std::fmt::Debug for HttpGatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn submit_transaction(
        &self,
        request: &GatewayTransactionRequest,
        credentials: &Credentials,
    ) -> GatewayResult<GatewayTransactionResponse> {
        let url = self.endpoint(&["api", "v1", "transactions"]);
        let body = SubmitBody {
            channel_name: &request.channel,
            chaincode_name: &request.chaincode,
            function_name: &request.function,
            args: &request.args,
            transient_data: &request.transient_data,
        };

        tracing::debug!(
            url = %url,
            channel = %request.channel,
            chaincode = %request.chaincode,
            function = %request.function,
            "Calling gateway submit"
        );

        let builder = self
            .authorize(self.http.post(url))
            .header(USER_CERT_HEADER, encode_header(&credentials.certificate))
            .header(USER_KEY_HEADER, encode_header(credentials.private_key()))
            .header(USER_MSP_HEADER, encode_header(&credentials.msp_id))
            .json(&body);

        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        let resp: GatewayTransactionResponse = unwrap_envelope(&body)?;

        tracing::info!(tx_id = %resp.tx_id, status = %resp.status, "Transaction submitted via gateway");
        Ok(resp)
    }

    async fn get_transaction(&self, tx_id: &str) -> GatewayResult<GatewayTransactionResponse> {
        let url = self.endpoint(&["api", "v1", "transactions", tx_id]);
        let (status, body) = self.send(self.authorize(self.http.get(url))).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        unwrap_envelope(&body)
    }

    async fn query_chaincode(
        &self,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>> {
        let url = self.endpoint(&["api", "v1", "channels", channel, "chaincodes", chaincode, "query"]);
        let builder = self
            .authorize(self.http.post(url))
            .json(&QueryBody { function, args });

        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        // Non-envelope bodies are returned verbatim.
        match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
            Ok(envelope) => match envelope.data {
                Some(data) => serde_json::to_vec(&data)
                    .map_err(|e| GatewayError::new(GatewayErrorKind::Protocol, e.to_string())),
                None => Ok(body),
            },
            Err(_) => Ok(body),
        }
    }
}

fn encode_header(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn unwrap_envelope<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|e| {
        GatewayError::new(
            GatewayErrorKind::Protocol,
            format!("failed to decode response: {}", e),
        )
    })?;

    match (envelope.success, envelope.data, envelope.error) {
        (true, Some(data), _) => Ok(data),
        (_, _, Some(err)) => Err(GatewayError::new(
            GatewayErrorKind::Rejected,
            format!("{} - {}", err.code, err.message),
        )),
        _ => Err(GatewayError::new(
            GatewayErrorKind::Protocol,
            "unexpected response format",
        )),
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> GatewayError {
    let kind = match status.as_u16() {
        404 => GatewayErrorKind::NotFound,
        401 | 403 => GatewayErrorKind::Unauthorized,
        408 | 504 => GatewayErrorKind::Timeout,
        429 | 502 | 503 => GatewayErrorKind::Unavailable,
        400..=499 => GatewayErrorKind::Rejected,
        _ => GatewayErrorKind::Internal,
    };

    let detail = serde_json::from_slice::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.error)
        .map(|err| format!("{} - {}", err.code, err.message))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    GatewayError::new(kind, format!("gateway returned status {}: {}", status.as_u16(), detail))
}

fn transport_error(err: &reqwest::Error) -> GatewayError {
    GatewayError::new(classify_transport(err), err.to_string())
}

fn classify_transport(err: &reqwest::Error) -> GatewayErrorKind {
    if err.is_timeout() {
        return GatewayErrorKind::Timeout;
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return GatewayErrorKind::ConnectionRefused,
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => return GatewayErrorKind::ConnectionReset,
                std::io::ErrorKind::TimedOut => return GatewayErrorKind::Timeout,
                _ => {}
            }
        }
        source = cause.source();
    }

    if err.is_decode() || err.is_builder() {
        GatewayErrorKind::Protocol
    } else {
        GatewayErrorKind::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpGatewayClient {
        HttpGatewayClient::new(&GatewayConfig {
            base_url: base.to_string(),
            api_key: Some("svc-key".into()),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = client("http://gateway:3000/");
        assert_eq!(
            c.endpoint(&["api", "v1", "transactions"]).as_str(),
            "http://gateway:3000/api/v1/transactions"
        );

        let prefixed = client("http://gateway:3000/fabric");
        assert_eq!(
            prefixed.endpoint(&["api", "v1", "transactions", "tx/1"]).as_str(),
            "http://gateway:3000/fabric/api/v1/transactions/tx%2F1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpGatewayClient::new(&GatewayConfig {
            base_url: "::nope".into(),
            ..GatewayConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Protocol);
    }

    #[test]
    fn test_status_classification() {
        let cases = [
            (StatusCode::NOT_FOUND, GatewayErrorKind::NotFound),
            (StatusCode::UNAUTHORIZED, GatewayErrorKind::Unauthorized),
            (StatusCode::GATEWAY_TIMEOUT, GatewayErrorKind::Timeout),
            (StatusCode::SERVICE_UNAVAILABLE, GatewayErrorKind::Unavailable),
            (StatusCode::TOO_MANY_REQUESTS, GatewayErrorKind::Unavailable),
            (StatusCode::BAD_REQUEST, GatewayErrorKind::Rejected),
            (StatusCode::INTERNAL_SERVER_ERROR, GatewayErrorKind::Internal),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, b"").kind, kind, "{status}");
        }
    }

    #[test]
    fn test_status_error_uses_envelope_message() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            br#"{"success":false,"error":{"code":"INVALID_ARGS","message":"missing arg"}}"#,
        );
        assert!(err.message.contains("INVALID_ARGS - missing arg"));
    }

    #[test]
    fn test_unwrap_envelope_error_body() {
        let err = unwrap_envelope::<GatewayTransactionResponse>(
            br#"{"success":false,"error":{"code":"ENDORSEMENT_FAILED","message":"policy"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Rejected);

        let err = unwrap_envelope::<GatewayTransactionResponse>(b"<html>").unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Protocol);
    }

    #[test]
    fn test_header_encoding_strips_newlines() {
        let encoded = encode_header("-----BEGIN CERTIFICATE-----\nMIIB\n");
        assert!(!encoded.contains('\n'));
        assert!(encoded.contains("%0A"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug = format!("{:?}", client("http://gateway:3000"));
        assert!(!debug.contains("svc-key"));
    }
}

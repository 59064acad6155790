//! Transport: turns one resolved call into one HTTP exchange.
//!
//! Responsibilities stop at "raw JSON or [`TransportError`]". Nothing here
//! knows about schemas, caching or pagination.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::args::ParamMap;
use crate::config::ClientConfig;
use crate::error::{ArgumentError, TransportError};
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest, ReqwestHttpClient};
use crate::retry::RetryConfig;
use crate::throttling::Throttle;

/// Query, body and per-call overrides for [`Transport::send`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub query: ParamMap,
    pub body: Option<Value>,
    pub timeout_ms: Option<u64>,
}

impl SendOptions {
    pub fn with_query(mut self, query: ParamMap) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP dispatcher bound to one API base URL.
#[derive(Clone)]
pub struct Transport {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    headers: BTreeMap<String, String>,
    auth: HttpAuth,
    timeout_ms: u64,
    retry: RetryConfig,
    throttle: Option<Throttle>,
}

impl Transport {
    /// Transport backed by the reqwest client.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_http_client(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(config: &ClientConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: config.base_url().to_owned(),
            headers: config.headers().clone(),
            auth: config.auth().clone(),
            timeout_ms: config.timeout_ms(),
            retry: config.retry().clone(),
            throttle: config.rate_limit().map(Throttle::new),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Absolute URL for `path` with `query` appended.
    pub fn url_for(&self, path: &str, query: &ParamMap) -> String {
        let mut url = self.base_url.clone();
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);

        let query = encode_query(query);
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        url
    }

    /// Sends one request and returns the decoded JSON payload.
    ///
    /// `204 No Content` and empty bodies decode to `null`. Retries follow the
    /// configured [`RetryConfig`]; every attempt waits for the throttle first.
    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        options: SendOptions,
    ) -> Result<Value, TransportError> {
        let request = self.build_request(method, path, &options);
        tracing::debug!(method = %method, url = %request.url, "dispatching request");

        let mut attempt = 0;
        loop {
            if let Some(throttle) = &self.throttle {
                throttle.acquire().await;
            }

            match self.execute_once(request.clone()).await {
                Ok(payload) => return Ok(payload),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        method = %method,
                        path = request.path_and_query(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn build_request(&self, method: HttpMethod, path: &str, options: &SendOptions) -> HttpRequest {
        let mut request = HttpRequest::new(method, self.url_for(path, &options.query))
            .with_timeout_ms(options.timeout_ms.unwrap_or(self.timeout_ms))
            .with_header("accept", "application/json");
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }
        request = request.with_auth(&self.auth);

        if let Some(body) = &options.body {
            request = request
                .with_header("content-type", "application/json")
                .with_body(body.to_string());
        }
        request
    }

    async fn execute_once(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(TransportError::status(response.status, response.body));
        }

        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body).map_err(|error| {
            let message = format!("response body is not valid JSON: {error}");
            TransportError::decode(response.status, response.body, message)
        })
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry", &self.retry)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

/// Substitutes `{name}` placeholders with URL-encoded parameter values.
pub fn render_path(operation: &str, template: &str, params: &ParamMap) -> Result<String, ArgumentError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        let value = params
            .get(name)
            .and_then(scalar_to_string)
            .ok_or_else(|| ArgumentError::MissingParameter {
                operation: operation.to_owned(),
                name: name.to_owned(),
            })?;

        rendered.push_str(&rest[..start]);
        rendered.push_str(&urlencoding::encode(&value));
        rest = &after[end + 1..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// `k=v&...` in key order. Nulls are dropped, arrays repeat the key and
/// objects are sent as compact JSON.
pub fn encode_query(query: &ParamMap) -> String {
    let mut pairs = Vec::new();
    for (name, value) in query {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(item) = query_value(item) {
                        pairs.push(encode_pair(name, &item));
                    }
                }
            }
            other => {
                if let Some(value) = query_value(other) {
                    pairs.push(encode_pair(name, &value));
                }
            }
        }
    }
    pairs.join("&")
}

fn encode_pair(name: &str, value: &str) -> String {
    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        scalar => scalar_to_string(scalar),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::TransportErrorKind;
    use crate::http_client::{HttpError, HttpResponse, RecordingHttpClient};

    fn config() -> ClientConfig {
        ClientConfig::new("http://api.test/").expect("valid base url")
    }

    fn params(pairs: &[(&str, Value)]) -> ParamMap {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn renders_and_encodes_path_placeholders() {
        let rendered = render_path(
            "products.retrieve",
            "/shop/{category}/products/{id}/",
            &params(&[("category", json!("home & garden")), ("id", json!(7))]),
        )
        .expect("all placeholders bound");

        assert_eq!(rendered, "/shop/home%20%26%20garden/products/7/");
    }

    #[test]
    fn unbound_placeholder_is_a_missing_parameter() {
        let err = render_path("products.retrieve", "/shop/products/{id}/", &ParamMap::new())
            .expect_err("id is unbound");
        assert!(matches!(err, ArgumentError::MissingParameter { ref name, .. } if name == "id"));
    }

    #[test]
    fn query_drops_nulls_and_repeats_arrays() {
        let encoded = encode_query(&params(&[
            ("page", json!(2)),
            ("search", Value::Null),
            ("tag", json!(["a", "b c"])),
        ]));

        assert_eq!(encoded, "page=2&tag=a&tag=b%20c");
    }

    #[tokio::test]
    async fn send_builds_request_from_config_and_options() {
        let http = RecordingHttpClient::always(HttpResponse::ok_json(r#"{"id":1}"#));
        let config = config()
            .with_header("X-Tenant", "acme")
            .expect("valid header")
            .with_auth(HttpAuth::BearerToken(String::from("secret")));
        let transport = Transport::with_http_client(&config, Arc::new(http.clone()));

        let payload = transport
            .send(
                HttpMethod::Post,
                "/shop/products/",
                SendOptions::default()
                    .with_query(params(&[("notify", json!(true))]))
                    .with_body(json!({"name": "Lamp"}))
                    .with_timeout_ms(Some(250)),
            )
            .await
            .expect("stubbed response");

        assert_eq!(payload, json!({"id": 1}));
        let request = &http.recorded_requests()[0];
        assert_eq!(request.url, "http://api.test/shop/products/?notify=true");
        assert_eq!(request.timeout_ms, 250);
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"Lamp"}"#));
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.headers.get("x-tenant").map(String::as_str), Some("acme"));
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn no_content_decodes_to_null() {
        let http = RecordingHttpClient::always(HttpResponse::no_content());
        let transport = Transport::with_http_client(&config(), Arc::new(http));

        let payload = transport
            .send(HttpMethod::Delete, "/shop/products/1/", SendOptions::default())
            .await
            .expect("204 is success");
        assert_eq!(payload, Value::Null);
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let http = RecordingHttpClient::always(HttpResponse::new(404, r#"{"detail":"Not found."}"#));
        let transport = Transport::with_http_client(&config(), Arc::new(http));

        let err = transport
            .send(HttpMethod::Get, "/shop/products/99/", SendOptions::default())
            .await
            .expect_err("404 must fail");

        assert!(err.is_not_found());
        assert_eq!(
            err.parsed_body().and_then(|body| body.get("detail")),
            Some(&json!("Not found."))
        );
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let http = RecordingHttpClient::always(HttpResponse::ok_json("<html>oops</html>"));
        let transport = Transport::with_http_client(&config(), Arc::new(http));

        let err = transport
            .send(HttpMethod::Get, "/shop/products/", SendOptions::default())
            .await
            .expect_err("html is not json");
        assert_eq!(err.kind(), TransportErrorKind::Decode);
        assert_eq!(err.body(), Some("<html>oops</html>"));
    }

    #[tokio::test]
    async fn network_errors_are_not_retried_by_default() {
        let http = RecordingHttpClient::new(|_| Err(HttpError::connect("refused")));
        let transport = Transport::with_http_client(&config(), Arc::new(http.clone()));

        let err = transport
            .send(HttpMethod::Get, "/shop/products/", SendOptions::default())
            .await
            .expect_err("connection refused");
        assert_eq!(err.kind(), TransportErrorKind::Connect);
        assert_eq!(http.call_count(), 1);
    }

    #[tokio::test]
    async fn configured_retry_recovers_from_gateway_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let http = RecordingHttpClient::new(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(HttpResponse::new(503, "unavailable"))
            } else {
                Ok(HttpResponse::ok_json("[]"))
            }
        });
        let config = config().with_retry(RetryConfig::fixed(Duration::from_millis(1), 2));
        let transport = Transport::with_http_client(&config, Arc::new(http.clone()));

        let payload = transport
            .send(HttpMethod::Get, "/shop/products/", SendOptions::default())
            .await
            .expect("second attempt succeeds");
        assert_eq!(payload, json!([]));
        assert_eq!(http.call_count(), 2);
    }
}

//! Rate source trait and HTTP adapters.

use std::str::FromStr;

use async_trait::async_trait;
use fxshim_common::{CurrencyPair, Rate};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use url::Url;

use crate::error::{FxError, FxResult, SourceFailure};

/// Outcome of asking one source for a rate.
pub type SourceResult = Result<Rate, SourceFailure>;

/// One external rate provider.
///
/// Ordinary failures are returned as [`SourceFailure`] values so the chain
/// can always move on to the next source. Implementations make one outbound
/// call per `fetch` and never retry internally.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Disabled sources are skipped by the chain.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Fetch the current rate for a currency pair.
    async fn fetch(&self, pair: &CurrencyPair) -> SourceResult;
}

const USER_AGENT: &str = concat!("fxshim/", env!("CARGO_PKG_VERSION"));

fn build_client() -> FxResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FxError::Configuration(format!("failed to build HTTP client: {}", e)))
}

fn parse_endpoint(name: &str, endpoint: &str) -> FxResult<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| FxError::Configuration(format!("invalid {} endpoint {:?}: {}", name, endpoint, e)))?;

    if url.cannot_be_a_base() {
        return Err(FxError::Configuration(format!(
            "{} endpoint {:?} cannot carry a path",
            name, endpoint
        )));
    }

    Ok(url)
}

/// Issue a GET and return the body of a successful response.
async fn get_body(client: &Client, url: Url) -> Result<String, SourceFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceFailure::Transport(e.without_url().to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(SourceFailure::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        return Err(SourceFailure::Status(status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| SourceFailure::Transport(e.without_url().to_string()))
}

/// Read a JSON number (or numeric string) as a `Decimal` without going through `f64`.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn parse_json(body: &str) -> Result<Value, SourceFailure> {
    serde_json::from_str(body).map_err(|e| SourceFailure::Malformed(format!("invalid JSON: {}", e)))
}

fn build_rate(pair: &CurrencyPair, value: Option<&Value>, field: &str, source: &str) -> SourceResult {
    let value = value
        .and_then(decimal_from_json)
        .ok_or_else(|| SourceFailure::Malformed(format!("missing or non-numeric `{}`", field)))?;

    Rate::new(pair.clone(), value, source).map_err(|e| SourceFailure::Malformed(e.to_string()))
}

/// Keyed adapter for the ExchangeRate-API pair endpoint.
///
/// `GET {endpoint}/{key}/pair/{BASE}/{QUOTE}` answering
/// `{"result": "success", "conversion_rate": 0.85}`.
pub struct ExchangeRateApiSource {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl ExchangeRateApiSource {
    pub const NAME: &'static str = "exchangerate-api";
    pub const DEFAULT_ENDPOINT: &'static str = "https://v6.exchangerate-api.com/v6";

    /// Create the adapter; without an API key it stays disabled.
    pub fn new(endpoint: &str, api_key: Option<String>) -> FxResult<Self> {
        Self::with_client(build_client()?, endpoint, api_key)
    }

    /// Create the adapter around an existing HTTP client.
    pub fn with_client(client: Client, endpoint: &str, api_key: Option<String>) -> FxResult<Self> {
        Ok(Self {
            client,
            endpoint: parse_endpoint(Self::NAME, endpoint)?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn request_url(&self, key: &str, pair: &CurrencyPair) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([key, "pair", pair.base.code(), pair.quote.code()]);
        }
        url
    }

    /// Interpret a response body.
    pub fn parse_body(pair: &CurrencyPair, body: &str) -> SourceResult {
        let json = parse_json(body)?;

        match json.get("result").and_then(Value::as_str) {
            Some("success") => build_rate(pair, json.get("conversion_rate"), "conversion_rate", Self::NAME),
            Some("error") => {
                let error_type = json
                    .get("error-type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                if error_type == "quota-reached" {
                    Err(SourceFailure::RateLimited {
                        retry_after_secs: None,
                    })
                } else {
                    Err(SourceFailure::Malformed(format!("provider error: {}", error_type)))
                }
            }
            _ => Err(SourceFailure::Malformed("missing `result` field".to_string())),
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, pair: &CurrencyPair) -> SourceResult {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceFailure::Transport("no API key configured".to_string()))?;

        let body = get_body(&self.client, self.request_url(key, pair)).await?;
        Self::parse_body(pair, &body)
    }
}

/// Keyless adapter for the Frankfurter (ECB reference rate) API.
///
/// `GET {endpoint}/latest?base=BASE&symbols=QUOTE` answering
/// `{"base": "USD", "rates": {"EUR": 0.85}}`.
pub struct FrankfurterSource {
    client: Client,
    endpoint: Url,
}

impl FrankfurterSource {
    pub const NAME: &'static str = "frankfurter";
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.frankfurter.dev/v1";

    pub fn new(endpoint: &str) -> FxResult<Self> {
        Self::with_client(build_client()?, endpoint)
    }

    /// Create the adapter around an existing HTTP client.
    pub fn with_client(client: Client, endpoint: &str) -> FxResult<Self> {
        Ok(Self {
            client,
            endpoint: parse_endpoint(Self::NAME, endpoint)?,
        })
    }

    fn request_url(&self, pair: &CurrencyPair) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("latest");
        }
        url.query_pairs_mut()
            .append_pair("base", pair.base.code())
            .append_pair("symbols", pair.quote.code());
        url
    }

    /// Interpret a response body.
    pub fn parse_body(pair: &CurrencyPair, body: &str) -> SourceResult {
        let json = parse_json(body)?;

        if let Some(base) = json.get("base").and_then(Value::as_str) {
            if !base.eq_ignore_ascii_case(pair.base.code()) {
                return Err(SourceFailure::Malformed(format!(
                    "quoted against {} instead of {}",
                    base, pair.base
                )));
            }
        }

        let field = format!("rates.{}", pair.quote.code());
        let value = json.get("rates").and_then(|r| r.get(pair.quote.code()));
        build_rate(pair, value, &field, Self::NAME)
    }
}

#[async_trait]
impl RateSource for FrankfurterSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self, pair: &CurrencyPair) -> SourceResult {
        let body = get_body(&self.client, self.request_url(pair)).await?;
        Self::parse_body(pair, &body)
    }
}

/// Scripted rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    enabled: bool,
    delay: Option<std::time::Duration>,
    script: parking_lot::Mutex<std::collections::VecDeque<Result<Decimal, SourceFailure>>>,
    steady: parking_lot::Mutex<Result<Decimal, SourceFailure>>,
    calls: std::sync::atomic::AtomicUsize,
    call_log: Option<std::sync::Arc<parking_lot::Mutex<Vec<String>>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// A source that always answers with `value`.
    pub fn returning(name: impl Into<String>, value: Decimal) -> Self {
        Self::with_response(name, Ok(value))
    }

    /// A source that always fails with `failure`.
    pub fn failing(name: impl Into<String>, failure: SourceFailure) -> Self {
        Self::with_response(name, Err(failure))
    }

    fn with_response(name: impl Into<String>, response: Result<Decimal, SourceFailure>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            delay: None,
            script: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            steady: parking_lot::Mutex::new(response),
            calls: std::sync::atomic::AtomicUsize::new(0),
            call_log: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Mark the source as unconfigured.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Append this source's name to a shared log on every call.
    pub fn with_call_log(mut self, log: std::sync::Arc<parking_lot::Mutex<Vec<String>>>) -> Self {
        self.call_log = Some(log);
        self
    }

    /// Queue a one-off response, used before the steady one.
    pub fn then(self, response: Result<Decimal, SourceFailure>) -> Self {
        self.script.lock().push_back(response);
        self
    }

    /// Replace the steady response.
    pub fn set_response(&self, response: Result<Decimal, SourceFailure>) {
        *self.steady.lock() = response;
    }

    /// Number of times `fetch` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, pair: &CurrencyPair) -> SourceResult {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(log) = &self.call_log {
            log.lock().push(self.name.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.steady.lock().clone());

        let value = response?;
        Rate::new(pair.clone(), value, self.name.clone())
            .map_err(|e| SourceFailure::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> CurrencyPair {
        CurrencyPair::usd_eur()
    }

    #[test]
    fn test_exchangerate_api_success() {
        let body = r#"{"result":"success","base_code":"USD","target_code":"EUR","conversion_rate":0.8532}"#;
        let rate = ExchangeRateApiSource::parse_body(&pair(), body).unwrap();

        assert_eq!(rate.value(), dec!(0.8532));
        assert_eq!(rate.source(), ExchangeRateApiSource::NAME);
        assert_eq!(rate.pair(), &pair());
    }

    #[test]
    fn test_exchangerate_api_quota_is_rate_limited() {
        let body = r#"{"result":"error","error-type":"quota-reached"}"#;
        let result = ExchangeRateApiSource::parse_body(&pair(), body);

        assert!(matches!(result, Err(SourceFailure::RateLimited { .. })));
    }

    #[test]
    fn test_exchangerate_api_other_error_is_malformed() {
        let body = r#"{"result":"error","error-type":"invalid-key"}"#;
        let result = ExchangeRateApiSource::parse_body(&pair(), body);

        assert_eq!(
            result,
            Err(SourceFailure::Malformed("provider error: invalid-key".into()))
        );
    }

    #[test]
    fn test_exchangerate_api_missing_rate() {
        let body = r#"{"result":"success"}"#;
        let result = ExchangeRateApiSource::parse_body(&pair(), body);

        assert!(matches!(result, Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn test_zero_rate_is_malformed() {
        let body = r#"{"result":"success","conversion_rate":0}"#;
        let result = ExchangeRateApiSource::parse_body(&pair(), body);

        assert!(matches!(result, Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn test_frankfurter_success() {
        let body = r#"{"amount":1.0,"base":"USD","date":"2024-05-03","rates":{"EUR":0.9312}}"#;
        let rate = FrankfurterSource::parse_body(&pair(), body).unwrap();

        assert_eq!(rate.value(), dec!(0.9312));
        assert_eq!(rate.source(), FrankfurterSource::NAME);
    }

    #[test]
    fn test_frankfurter_wrong_base() {
        let body = r#"{"amount":1.0,"base":"GBP","rates":{"EUR":1.17}}"#;
        let result = FrankfurterSource::parse_body(&pair(), body);

        assert!(matches!(result, Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn test_frankfurter_missing_quote() {
        let body = r#"{"base":"USD","rates":{"GBP":0.79}}"#;
        let result = FrankfurterSource::parse_body(&pair(), body);

        assert!(matches!(result, Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let result = FrankfurterSource::parse_body(&pair(), "<html>busy</html>");
        assert!(matches!(result, Err(SourceFailure::Malformed(_))));
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&serde_json::json!(0.8532)), Some(dec!(0.8532)));
        assert_eq!(decimal_from_json(&serde_json::json!("1.25")), Some(dec!(1.25)));
        assert_eq!(decimal_from_json(&serde_json::json!(12)), Some(dec!(12)));
        assert_eq!(decimal_from_json(&serde_json::json!(true)), None);
        assert_eq!(decimal_from_json(&serde_json::json!("abc")), None);
    }

    #[test]
    fn test_request_urls() {
        let primary =
            ExchangeRateApiSource::new("https://example.test/v6/", Some("KEY".into())).unwrap();
        assert_eq!(
            primary.request_url("KEY", &pair()).as_str(),
            "https://example.test/v6/KEY/pair/USD/EUR"
        );

        let secondary = FrankfurterSource::new("https://example.test/v1").unwrap();
        assert_eq!(
            secondary.request_url(&pair()).as_str(),
            "https://example.test/v1/latest?base=USD&symbols=EUR"
        );
    }

    #[test]
    fn test_missing_key_disables_source() {
        let source = ExchangeRateApiSource::new(ExchangeRateApiSource::DEFAULT_ENDPOINT, None).unwrap();
        assert!(!source.is_enabled());

        let blank = ExchangeRateApiSource::new(ExchangeRateApiSource::DEFAULT_ENDPOINT, Some("  ".into()))
            .unwrap();
        assert!(!blank.is_enabled());
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        assert!(matches!(
            FrankfurterSource::new("not a url"),
            Err(FxError::Configuration(_))
        ));
        assert!(matches!(
            FrankfurterSource::new("mailto:rates@example.test"),
            Err(FxError::Configuration(_))
        ));
    }

    /// Answer exactly one HTTP request with `response`, returning the base URL.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{}/v1", addr)
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_http_success() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 34\r\nConnection: close\r\n\r\n{\"base\":\"USD\",\"rates\":{\"EUR\":0.9}}",
        )
        .await;
        let source = FrankfurterSource::with_client(local_client(), &endpoint).unwrap();

        let rate = source.fetch(&pair()).await.unwrap();

        assert_eq!(rate.value(), dec!(0.9));
    }

    #[tokio::test]
    async fn test_http_429_is_rate_limited_with_retry_after() {
        let endpoint = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 30\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let source = FrankfurterSource::with_client(local_client(), &endpoint).unwrap();

        assert_eq!(
            source.fetch(&pair()).await,
            Err(SourceFailure::RateLimited {
                retry_after_secs: Some(30)
            })
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let endpoint = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let source =
            ExchangeRateApiSource::with_client(local_client(), &endpoint, Some("KEY".into())).unwrap();

        assert_eq!(source.fetch(&pair()).await, Err(SourceFailure::Status(503)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/v1", listener.local_addr().unwrap());
        drop(listener);
        let source = FrankfurterSource::with_client(local_client(), &endpoint).unwrap();

        assert!(matches!(
            source.fetch(&pair()).await,
            Err(SourceFailure::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_source_script() {
        let source = MockRateSource::returning("mock", dec!(0.85))
            .then(Err(SourceFailure::Status(500)));

        assert_eq!(source.fetch(&pair()).await, Err(SourceFailure::Status(500)));
        assert_eq!(source.fetch(&pair()).await.unwrap().value(), dec!(0.85));
        assert_eq!(source.calls(), 2);
    }
}

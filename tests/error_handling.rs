//! Error-surface tests: every failure reaches the caller as a typed error of
//! the right kind, with enough detail to act on.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use restkit_core::{
    ApiClient, ApiError, ArgumentError, CallArgs, ClientConfig, ConfigError, ErrorKind, HttpError,
    HttpMethod, HttpResponse, QueryStatus, RecordingHttpClient, RetryConfig, TransportErrorKind,
};
use serde_json::json;

use support::{products, Shop};

fn client_with(config: ClientConfig, http: &RecordingHttpClient) -> ApiClient {
    ApiClient::with_http_client(&config, Arc::new(http.clone()))
}

fn test_config() -> ClientConfig {
    ClientConfig::new("http://shop.test").expect("valid base url")
}

fn argument_error(error: ApiError) -> ArgumentError {
    match error {
        ApiError::Argument(error) => error,
        other => panic!("expected argument error, got {other:?}"),
    }
}

// =============================================================================
// Argument errors never reach the network
// =============================================================================

#[tokio::test]
async fn argument_errors_are_raised_before_any_request() {
    let http = RecordingHttpClient::always(HttpResponse::no_content());
    let client = client_with(test_config(), &http);
    let ns = products();
    let retrieve = ns.fetcher("retrieve").expect("retrieve is declared");
    let list = ns.fetcher("list").expect("list is declared");
    let create = ns.fetcher("create").expect("create is declared");

    let missing = retrieve.fetch(CallArgs::none(), Some(&client)).await;
    assert!(matches!(
        argument_error(missing.expect_err("id is required")),
        ArgumentError::MissingParameter { name, .. } if name == "id"
    ));

    let too_many = retrieve.fetch(vec![json!(1), json!(2)], Some(&client)).await;
    assert!(matches!(
        argument_error(too_many.expect_err("one parameter only")),
        ArgumentError::TooManyArguments { expected: 1, received: 2, .. }
    ));

    let unknown = list.fetch(json!({"pagee": 2}), Some(&client)).await;
    assert!(matches!(
        argument_error(unknown.expect_err("typo in parameter name")),
        ArgumentError::UnknownParameter { name, .. } if name == "pagee"
    ));

    let wrong_type = list.fetch(json!({"page": "two"}), Some(&client)).await;
    assert!(matches!(
        argument_error(wrong_type.expect_err("page is an integer")),
        ArgumentError::InvalidParameterType { name, .. } if name == "page"
    ));

    let bad_body = create.fetch(json!({"name": "Lamp"}), Some(&client)).await;
    match argument_error(bad_body.expect_err("price is required")) {
        ArgumentError::InvalidBody { issues, .. } => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].path_string(), "price");
        }
        other => panic!("expected invalid body, got {other:?}"),
    }

    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn unknown_operation_is_an_argument_error() {
    let http = RecordingHttpClient::always(HttpResponse::no_content());
    let client = client_with(test_config(), &http);

    let error = products()
        .call("archive", json!(1), Some(&client))
        .await
        .expect_err("archive is not declared");

    assert_eq!(error.kind(), ErrorKind::Argument);
    assert!(error.to_string().contains("archive"));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    assert!(matches!(
        ClientConfig::new("shop.test"),
        Err(ConfigError::InvalidBaseUrl { .. })
    ));
    assert!(matches!(
        test_config().with_timeout_ms(0),
        Err(ConfigError::InvalidTimeout { .. })
    ));
    assert!(matches!(
        test_config().with_header("bad header", "x"),
        Err(ConfigError::InvalidHeader { .. })
    ));
}

// =============================================================================
// Transport errors
// =============================================================================

#[tokio::test]
async fn missing_product_is_a_not_found_transport_error() {
    // Given: the mock shop with no product 404
    let shop = Shop::start().await;

    // When: it is fetched
    let error = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .fetch(json!(404), Some(&shop.client))
        .await
        .expect_err("product does not exist");

    // Then: a status error with the parsed body and no diagnostic
    let transport = error.as_transport().expect("transport error");
    assert_eq!(transport.kind(), TransportErrorKind::Status);
    assert!(transport.is_not_found());
    assert_eq!(transport.parsed_body(), Some(&json!({"detail": "Not found."})));
    assert!(shop.sink.is_empty());
}

#[tokio::test]
async fn page_past_the_end_is_not_found() {
    let shop = Shop::start().await;

    let error = products()
        .fetcher("list")
        .expect("list is declared")
        .fetch(json!({"page": 9}), Some(&shop.client))
        .await
        .expect_err("only three pages exist");

    let transport = error.as_transport().expect("transport error");
    assert_eq!(transport.status_code(), Some(404));
    assert_eq!(transport.parsed_body(), Some(&json!({"detail": "Invalid page."})));
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let http = RecordingHttpClient::always(HttpResponse::new(200, "<html>maintenance</html>"));
    let client = client_with(test_config(), &http);

    let error = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .fetch(json!(1), Some(&client))
        .await
        .expect_err("html is not json");

    let transport = error.as_transport().expect("transport error");
    assert_eq!(transport.kind(), TransportErrorKind::Decode);
    assert_eq!(transport.body(), Some("<html>maintenance</html>"));
}

#[tokio::test]
async fn refused_connection_is_not_retried_by_default() {
    let http = RecordingHttpClient::new(|_| Err(HttpError::connect("connection refused")));
    let client = client_with(test_config(), &http);

    let error = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .fetch(json!(1), Some(&client))
        .await
        .expect_err("connection refused");

    assert_eq!(
        error.as_transport().map(|transport| transport.kind()),
        Some(TransportErrorKind::Connect)
    );
    assert_eq!(http.call_count(), 1);
}

#[tokio::test]
async fn configured_retry_recovers_from_unavailable_upstream() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let http = RecordingHttpClient::new(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(HttpResponse::new(503, r#"{"detail":"busy"}"#))
        } else {
            Ok(HttpResponse::ok_json(
                r#"{"id":1,"name":"Lamp","slug":"lamp","price":1.0,"status":"active","tags":[]}"#,
            ))
        }
    });
    let config = test_config().with_retry(RetryConfig::fixed(Duration::from_millis(1), 2));
    let client = client_with(config, &http);

    let product = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .fetch(json!(1), Some(&client))
        .await
        .expect("second attempt succeeds");

    assert_eq!(product["name"], json!("Lamp"));
    assert_eq!(http.call_count(), 2);
}

#[tokio::test]
async fn client_errors_are_never_retried() {
    let http = RecordingHttpClient::always(HttpResponse::new(404, r#"{"detail":"Not found."}"#));
    let config = test_config().with_retry(RetryConfig::fixed(Duration::from_millis(1), 3));
    let client = client_with(config, &http);

    let error = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .fetch(json!(1), Some(&client))
        .await
        .expect_err("404 is final");

    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(http.call_count(), 1);
}

// =============================================================================
// Errors in hook state
// =============================================================================

#[tokio::test]
async fn failed_revalidation_keeps_last_good_data() {
    // Given: a handle that loaded once, then an upstream that starts failing
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let http = RecordingHttpClient::new(move |request| {
        assert_eq!(request.method, HttpMethod::Get);
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(HttpResponse::ok_json(
                r#"{"id":1,"name":"Lamp","slug":"lamp","price":1.0,"status":"active","tags":[]}"#,
            ))
        } else {
            Ok(HttpResponse::new(500, "boom"))
        }
    });
    let client = client_with(test_config(), &http);
    let handle = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .query(json!(1), Some(&client));
    let first = handle.load().await;
    assert_eq!(first.status, QueryStatus::Resolved);

    // When: it revalidates
    let state = handle.revalidate().await;

    // Then: the error is exposed next to the previous data
    assert_eq!(state.status, QueryStatus::Errored);
    assert_eq!(state.data, first.data);
    let error = state.error.expect("error is populated");
    assert_eq!(
        error.as_transport().and_then(|transport| transport.status_code()),
        Some(500)
    );
}

#[tokio::test]
async fn schema_mismatch_in_hook_state_is_a_validation_error() {
    let http = RecordingHttpClient::always(HttpResponse::ok_json(r#"{"id":"one"}"#));
    let client = client_with(test_config(), &http);

    let state = products()
        .fetcher("retrieve")
        .expect("retrieve is declared")
        .query(json!(1), Some(&client))
        .load()
        .await;

    assert_eq!(state.status, QueryStatus::Errored);
    let error = state.error.expect("error is populated");
    let validation = error.as_validation().expect("validation error");
    assert_eq!(validation.issues()[0].path_string(), "id");
    assert!(validation.issues().len() > 1);
}

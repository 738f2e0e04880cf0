use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use resilient_http::{
    HttpError, PreparedRequest, RawResponse, RequestDescriptor, ResilientClient, Transport,
    TransportError, TransportErrorKind,
};
use serde_json::json;
use tokio::time::{Duration, Instant};

type Reply = Result<RawResponse, TransportError>;

/// In-memory transport replaying a script, then repeating `fallback`.
struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<(Instant, PreparedRequest)>>,
}

impl ScriptedTransport {
    fn always(reply: Reply) -> Arc<Self> {
        Self::sequence(Vec::new(), reply)
    }

    fn sequence(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn hits(&self) -> usize {
        self.calls.lock().expect("calls mutex must not be poisoned").len()
    }

    fn requests(&self) -> Vec<PreparedRequest> {
        self.calls
            .lock()
            .expect("calls mutex must not be poisoned")
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().expect("calls mutex must not be poisoned");
        calls
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &PreparedRequest) -> impl Future<Output = Reply> + Send {
        self.calls
            .lock()
            .expect("calls mutex must not be poisoned")
            .push((Instant::now(), request.clone()));
        let reply = self
            .script
            .lock()
            .expect("script mutex must not be poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        async move { reply }
    }
}

fn status(code: u16, body: &str) -> Reply {
    Ok(RawResponse::new(code, body))
}

fn network(kind: TransportErrorKind) -> Reply {
    Err(TransportError::new(kind, "connection reset by peer"))
}

fn client(transport: &Arc<ScriptedTransport>) -> ResilientClient<Arc<ScriptedTransport>> {
    ResilientClient::with_transport(Arc::clone(transport))
}

fn assert_gaps(actual: &[Duration], expected_ms: &[u64]) {
    assert_eq!(actual.len(), expected_ms.len(), "gaps: {actual:?}");
    for (gap, expected) in actual.iter().zip(expected_ms) {
        let expected = Duration::from_millis(*expected);
        assert!(
            *gap >= expected && *gap < expected + Duration::from_millis(10),
            "expected ~{expected:?}, got {gap:?}"
        );
    }
}

const URL: &str = "https://api.example.com/v1/resource";

#[tokio::test(start_paused = true)]
async fn success_returns_body_on_first_attempt_without_delay() {
    let transport = ScriptedTransport::always(status(200, r#"{"answer":42}"#));
    let started = Instant::now();

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.status(), 200);
    assert_eq!(envelope.data(), Some(&json!({"answer": 42})));
    assert!(envelope.error().is_none());
    assert_eq!(transport.hits(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn repeated_429_makes_four_attempts_with_exponential_delays() {
    let transport = ScriptedTransport::always(status(429, r#"{"error":"slow down"}"#));

    let envelope = client(&transport)
        .execute(&RequestDescriptor::post(URL).body(json!({"q": 1})))
        .await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 429);
    assert!(envelope.data().is_none());
    assert_eq!(transport.hits(), 4);
    assert_gaps(&transport.gaps(), &[1_000, 2_000, 4_000]);
    match envelope.error() {
        Some(HttpError::ExhaustedRetries { attempts, last }) => {
            assert_eq!(*attempts, 4);
            assert!(matches!(**last, HttpError::RateLimited { status: Some(429), .. }));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn not_found_fails_after_single_attempt() {
    let transport = ScriptedTransport::always(status(404, r#"{"error":"missing"}"#));

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 404);
    assert_eq!(transport.hits(), 1);
    assert_eq!(
        envelope.error(),
        Some(&HttpError::Client {
            status: 404,
            body: json!({"error": "missing"}),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn server_error_is_terminal_for_execute() {
    let transport = ScriptedTransport::always(status(503, "maintenance"));

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert_eq!(envelope.status(), 503);
    assert_eq!(transport.hits(), 1);
    assert!(matches!(envelope.error(), Some(HttpError::Server { .. })));
}

#[tokio::test(start_paused = true)]
async fn connection_failure_recovers_after_backoff() {
    let transport = ScriptedTransport::sequence(
        vec![network(TransportErrorKind::Connect)],
        status(201, r#"{"id":"c-1"}"#),
    );

    let envelope = client(&transport)
        .execute(&RequestDescriptor::post(URL).body(json!({"email": "a@b.c"})))
        .await;

    assert!(envelope.is_success());
    assert_eq!(envelope.status(), 201);
    assert_eq!(transport.hits(), 2);
    assert_gaps(&transport.gaps(), &[1_000]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_network_failures_report_synthetic_500() {
    let transport = ScriptedTransport::always(network(TransportErrorKind::Timeout));

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 500);
    assert_eq!(transport.hits(), 4);
    let message = envelope.error().expect("failure must carry error").to_string();
    assert!(message.contains("after 4 attempts"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn non_retryable_transport_error_is_not_retried() {
    let transport = ScriptedTransport::always(Err(TransportError::new(
        TransportErrorKind::Other,
        "too many redirects",
    )));

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert_eq!(envelope.status(), 500);
    assert_eq!(transport.hits(), 1);
    assert!(matches!(envelope.error(), Some(HttpError::Transport { .. })));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_signal_in_error_body_is_retried() {
    let transport = ScriptedTransport::sequence(
        vec![status(503, r#"{"error":"Rate limit exceeded"}"#)],
        status(200, "ok"),
    );

    let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.data(), Some(&json!("ok")));
    assert_eq!(transport.hits(), 2);
}

#[tokio::test(start_paused = true)]
async fn caller_content_type_overrides_default_and_accept_stays() {
    let transport = ScriptedTransport::always(status(200, "{}"));

    client(&transport)
        .execute(&RequestDescriptor::post(URL).header("Content-Type", "text/plain"))
        .await;

    let requests = transport.requests();
    let headers = &requests[0].headers;
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(headers["accept"], "application/json");
}

#[tokio::test(start_paused = true)]
async fn retries_reuse_the_same_prepared_request() {
    let transport = ScriptedTransport::sequence(
        vec![status(429, ""), status(429, "")],
        status(200, "{}"),
    );

    client(&transport)
        .execute(
            &RequestDescriptor::put(URL)
                .body(json!({"name": "Kit"}))
                .timeout_ms(2_500),
        )
        .await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.url.as_str(), URL);
        assert_eq!(request.timeout, Duration::from_millis(2_500));
        assert_eq!(request.body.as_deref(), Some(br#"{"name":"Kit"}"#.as_slice()));
    }
}

#[tokio::test(start_paused = true)]
async fn invalid_descriptor_never_reaches_the_network() {
    let transport = ScriptedTransport::always(status(200, "{}"));

    let envelope = client(&transport)
        .execute(&RequestDescriptor::get("api/relative"))
        .await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 500);
    assert!(matches!(
        envelope.error(),
        Some(HttpError::InvalidRequest { .. })
    ));
    assert_eq!(transport.hits(), 0);
}

#[tokio::test(start_paused = true)]
async fn terminal_failures_always_have_error_and_no_data() {
    for code in [400, 401, 403, 404, 409, 422, 500, 501, 502, 503] {
        let transport = ScriptedTransport::always(status(code, r#"{"error":"nope"}"#));

        let envelope = client(&transport).execute(&RequestDescriptor::get(URL)).await;

        assert!(!envelope.is_success(), "status {code}");
        assert!(envelope.error().is_some(), "status {code}");
        assert!(envelope.data().is_none(), "status {code}");
        assert_eq!(envelope.status(), code);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_do_not_share_retry_state() {
    let transport = ScriptedTransport::sequence(vec![status(429, "")], status(200, "{}"));
    let client = client(&transport);
    let first = RequestDescriptor::get(format!("{URL}/a"));
    let second = RequestDescriptor::get(format!("{URL}/b"));

    let (a, b) = tokio::join!(client.execute(&first), client.execute(&second));

    assert!(a.is_success());
    assert!(b.is_success());
    assert_eq!(transport.hits(), 3);
}

#[tokio::test(start_paused = true)]
async fn outer_retry_on_server_errors_backs_off_and_reports_attempts() {
    let transport = ScriptedTransport::always(status(500, r#"{"error":"model overloaded"}"#));
    let built = AtomicUsize::new(0);

    let envelope = client(&transport)
        .execute_with_retry(
            || {
                built.fetch_add(1, Ordering::SeqCst);
                RequestDescriptor::post(URL).body(json!({"message": "hello"}))
            },
            3,
        )
        .await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 500);
    assert_eq!(transport.hits(), 3);
    assert_eq!(built.load(Ordering::SeqCst), 3);
    assert_gaps(&transport.gaps(), &[2_000, 4_000]);
    let message = envelope.error().expect("failure must carry error").to_string();
    assert!(message.contains("after 3 attempts"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn outer_retry_honors_custom_bound() {
    let transport = ScriptedTransport::always(status(502, "bad gateway"));

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::get(URL), 5)
        .await;

    assert_eq!(transport.hits(), 5);
    assert_gaps(&transport.gaps(), &[2_000, 4_000, 8_000, 16_000]);
    let message = envelope.error().expect("failure must carry error").to_string();
    assert!(message.contains("after 5 attempts"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn outer_retry_stops_on_client_error() {
    let transport = ScriptedTransport::always(status(400, r#"{"error":"message required"}"#));

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::post(URL), 5)
        .await;

    assert_eq!(transport.hits(), 1);
    assert_eq!(envelope.status(), 400);
    assert!(matches!(envelope.error(), Some(HttpError::Client { .. })));
}

#[tokio::test(start_paused = true)]
async fn outer_retry_recovers_after_outage() {
    let transport = ScriptedTransport::sequence(
        vec![status(503, "down")],
        status(200, r#"{"reply":"hi"}"#),
    );

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::post(URL), 3)
        .await;

    assert!(envelope.is_success());
    assert_eq!(envelope.data(), Some(&json!({"reply": "hi"})));
    assert_gaps(&transport.gaps(), &[2_000]);
}

#[tokio::test(start_paused = true)]
async fn outer_retry_stops_when_inner_rate_limit_is_exhausted() {
    let transport = ScriptedTransport::always(status(429, ""));

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::get(URL), 3)
        .await;

    assert_eq!(envelope.status(), 429);
    assert_eq!(transport.hits(), 4);
}

#[tokio::test(start_paused = true)]
async fn layered_retries_compound_for_network_failures() {
    let transport = ScriptedTransport::always(network(TransportErrorKind::Connect));

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::get(URL), 3)
        .await;

    assert_eq!(envelope.status(), 500);
    assert_eq!(transport.hits(), 12);
}

#[tokio::test(start_paused = true)]
async fn zero_outer_bound_still_makes_one_call() {
    let transport = ScriptedTransport::always(status(500, ""));

    let envelope = client(&transport)
        .execute_with_retry(|| RequestDescriptor::get(URL), 0)
        .await;

    assert_eq!(transport.hits(), 1);
    assert!(matches!(
        envelope.error(),
        Some(HttpError::ExhaustedRetries { attempts: 1, .. })
    ));
}

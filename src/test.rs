//! In-process ACME test server used by the unit tests.

use std::{
    net::TcpListener,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use actix_web::{dev::ServerHandle, web, App, HttpResponse, HttpServer};
use parking_lot::Mutex;
use regex::Regex;

pub(crate) struct TestState {
    base_url: String,
    nonce_counter: AtomicUsize,
    head_nonce_calls: AtomicUsize,
    bad_nonce_calls: AtomicUsize,
    flaky_calls: AtomicUsize,
    finalized: AtomicBool,
    challenge_triggered: AtomicBool,
    signed_bodies: Mutex<Vec<String>>,
}

pub(crate) struct TestServer {
    pub dir_url: String,
    pub base_url: String,
    state: web::Data<TestState>,
    handle: ServerHandle,
}

impl TestServer {
    pub fn nonce_url(&self) -> String {
        format!("{}/acme/new-nonce", self.base_url)
    }

    /// Number of HEAD calls made against the nonce endpoint.
    pub fn head_nonce_calls(&self) -> usize {
        self.state.head_nonce_calls.load(Ordering::SeqCst)
    }

    pub fn flaky_calls(&self) -> usize {
        self.state.flaky_calls.load(Ordering::SeqCst)
    }

    /// Raw JWS bodies posted to the bad-nonce capture route, in order.
    pub fn signed_bodies(&self) -> Vec<String> {
        self.state.signed_bodies.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

fn next_nonce(state: &TestState) -> String {
    format!(
        "test-nonce-{}",
        state.nonce_counter.fetch_add(1, Ordering::SeqCst)
    )
}

fn insert_url(state: &TestState, body: &str) -> String {
    Regex::new("<URL>")
        .unwrap()
        .replace_all(body, state.base_url.as_str())
        .into_owned()
}

fn acme_json(state: &TestState, status: actix_web::http::StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .insert_header(("Replay-Nonce", next_nonce(state)))
        .content_type("application/json")
        .body(body)
}

async fn directory(state: web::Data<TestState>) -> HttpResponse {
    const BODY: &str = r#"{
    "keyChange": "<URL>/acme/key-change",
    "newAccount": "<URL>/acme/new-acct",
    "newNonce": "<URL>/acme/new-nonce",
    "newOrder": "<URL>/acme/new-order",
    "revokeCert": "<URL>/acme/revoke-cert",
    "renewalInfo": "<URL>/renewal-info",
    "meta": {
        "caaIdentities": [
        "testdir.org"
        ]
    }
    }"#;

    HttpResponse::Ok()
        .content_type("application/json")
        .body(insert_url(&state, BODY))
}

async fn new_nonce(state: web::Data<TestState>) -> HttpResponse {
    state.head_nonce_calls.fetch_add(1, Ordering::SeqCst);

    HttpResponse::NoContent()
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .finish()
}

async fn new_acct(state: web::Data<TestState>) -> HttpResponse {
    const BODY: &str = r#"{
    "id": 7728515,
    "key": {
        "use": "sig",
        "kty": "EC",
        "crv": "P-256",
        "alg": "ES256",
        "x": "ttpobTRK2bw7ttGBESRO7Nb23mbIRfnRZwunL1W6wRI",
        "y": "h2Z00J37_2qRKH0-flrHEsH0xbit915Tyvd2v_CAOSk"
    },
    "contact": [
        "mailto:foo@bar.com"
    ],
    "initialIp": "90.171.37.12",
    "createdAt": "2018-12-31T17:15:40.399104457Z",
    "status": "valid"
    }"#;

    let location = insert_url(&state, "<URL>/acme/acct/7728515");

    HttpResponse::Created()
        .insert_header(("Location", location))
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .content_type("application/json")
        .body(BODY)
}

async fn new_order(state: web::Data<TestState>) -> HttpResponse {
    const BODY: &str = r#"{
    "status": "pending",
    "expires": "2026-09-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    let location = insert_url(&state, "<URL>/acme/order/YTqpYUthlVfwBncUufE8");
    let body = insert_url(&state, BODY);

    HttpResponse::Created()
        .insert_header(("Location", location))
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .content_type("application/json")
        .body(body)
}

async fn order_status(state: web::Data<TestState>) -> HttpResponse {
    const READY: &str = r#"{
    "status": "ready",
    "expires": "2026-09-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    const VALID: &str = r#"{
    "status": "valid",
    "expires": "2026-09-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324",
    "certificate": "<URL>/acme/cert/fae41c070f967713109028"
    }"#;

    let template = if state.finalized.load(Ordering::SeqCst) {
        VALID
    } else {
        READY
    };
    let body = insert_url(&state, template);

    acme_json(&state, actix_web::http::StatusCode::OK, body)
}

async fn authz(state: web::Data<TestState>) -> HttpResponse {
    const PENDING: &str = r#"{
        "identifier": {
            "type": "dns",
            "value": "acme-test.example.com"
        },
        "status": "pending",
        "expires": "2026-09-09T08:26:43Z",
        "challenges": [
        {
            "type": "http-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        },
        {
            "type": "tls-alpn-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789598",
            "token": "WCdRWkCy4THTD_j5IH4ISAzr59lFIg5wzYmKxuOJ1lU"
        },
        {
            "type": "dns-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789599",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }
        ]
    }"#;

    const VALID: &str = r#"{
        "identifier": {
            "type": "dns",
            "value": "acme-test.example.com"
        },
        "status": "valid",
        "expires": "2026-09-09T08:26:43Z",
        "challenges": [
        {
            "type": "http-01",
            "status": "valid",
            "validated": "2026-08-07T00:00:01Z",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        }
        ]
    }"#;

    let template = if state.challenge_triggered.load(Ordering::SeqCst) {
        VALID
    } else {
        PENDING
    };
    let body = insert_url(&state, template);

    acme_json(&state, actix_web::http::StatusCode::CREATED, body)
}

async fn challenge(state: web::Data<TestState>) -> HttpResponse {
    const BODY: &str = r#"{
    "type": "http-01",
    "status": "valid",
    "validated": "2026-08-07T00:00:01Z",
    "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597",
    "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
    }"#;

    state.challenge_triggered.store(true, Ordering::SeqCst);
    let body = insert_url(&state, BODY);

    acme_json(&state, actix_web::http::StatusCode::OK, body)
}

async fn finalize(state: web::Data<TestState>) -> HttpResponse {
    const BODY: &str = r#"{
    "status": "processing",
    "expires": "2026-09-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    state.finalized.store(true, Ordering::SeqCst);
    let body = insert_url(&state, BODY);

    acme_json(&state, actix_web::http::StatusCode::OK, body)
}

async fn certificate(state: web::Data<TestState>) -> HttpResponse {
    const CERT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIBmTCCAT+gAwIBAgIUD62Dt+dpEhKlQrIdk8B6C8VbYp0wCgYIKoZIzj0EAwIw
ITEfMB0GA1UEAwwWcmVuZXctdGVzdC5leGFtcGxlLmNvbTAgFw0yNjA4MDcwNTUy
NDFaGA8yMTI2MDcxNDA1NTI0MVowITEfMB0GA1UEAwwWcmVuZXctdGVzdC5leGFt
cGxlLmNvbTBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABCzL2PgZ+rO5toOxuwNU
P/cxxrpjDU7o6UUfbaKKWqqSLdJZVo2v1EnsaUNqhkzbRFkKUAkr61gBcD9ZxQcG
s6OjUzBRMB0GA1UdDgQWBBSakXOStWRUDm5FQGyFUtn2hCdrGDAfBgNVHSMEGDAW
gBSakXOStWRUDm5FQGyFUtn2hCdrGDAPBgNVHRMBAf8EBTADAQH/MAoGCCqGSM49
BAMCA0gAMEUCIQDAsD/Lgsiyz8MAO48g8bknE7UcAVlNz3+7heqq+ROOEQIgKAqF
7VxHKf77g2MenA27SLzzNMpYncRW8vj9gYjM1m4=
-----END CERTIFICATE-----
";

    HttpResponse::Ok()
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .content_type("application/pem-certificate-chain")
        .body(CERT_PEM)
}

async fn revoke_cert(state: web::Data<TestState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .finish()
}

async fn renewal_info(path: web::Path<String>) -> HttpResponse {
    // base64url(AKI "abcd") "." base64url(serial "0102")
    if path.as_str() != "q80.AQI" {
        return HttpResponse::NotFound().finish();
    }

    const BODY: &str = r#"{
    "suggestedWindow": {
        "start": "2026-08-01T00:00:00Z",
        "end": "2026-08-08T00:00:00Z"
    },
    "explanationURL": "https://testdir.org/docs/ari"
    }"#;

    HttpResponse::Ok()
        .content_type("application/json")
        .body(BODY)
}

/// Rejects the first signed request with a badNonce problem that carries no
/// Replay-Nonce header, forcing the client back to the nonce endpoint.
async fn bad_nonce_once(state: web::Data<TestState>, body: web::Bytes) -> HttpResponse {
    state
        .signed_bodies
        .lock()
        .push(String::from_utf8_lossy(&body).into_owned());

    if state.bad_nonce_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return HttpResponse::BadRequest()
            .content_type("application/problem+json")
            .body(r#"{"type": "urn:ietf:params:acme:error:badNonce", "detail": "nonce is stale"}"#);
    }

    acme_json(
        &state,
        actix_web::http::StatusCode::OK,
        r#"{"ok": true}"#.to_owned(),
    )
}

async fn always_rejects(state: web::Data<TestState>) -> HttpResponse {
    HttpResponse::Forbidden()
        .insert_header(("Replay-Nonce", next_nonce(&state)))
        .content_type("application/problem+json")
        .body(r#"{"type": "urn:ietf:params:acme:error:orderNotReady", "detail": "order not ready"}"#)
}

async fn flaky(state: web::Data<TestState>) -> HttpResponse {
    if state.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return HttpResponse::ServiceUnavailable().body("try again");
    }

    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"{"ok": true}"#)
}

pub(crate) fn with_test_server() -> TestServer {
    let lst = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = lst.local_addr().unwrap().port();

    let base_url = format!("http://127.0.0.1:{port}");
    let dir_url = format!("{base_url}/directory");

    let state = web::Data::new(TestState {
        base_url: base_url.clone(),
        nonce_counter: AtomicUsize::new(0),
        head_nonce_calls: AtomicUsize::new(0),
        bad_nonce_calls: AtomicUsize::new(0),
        flaky_calls: AtomicUsize::new(0),
        finalized: AtomicBool::new(false),
        challenge_triggered: AtomicBool::new(false),
        signed_bodies: Mutex::new(Vec::new()),
    });

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/directory", web::get().to(directory))
            .route("/acme/new-nonce", web::head().to(new_nonce))
            .route("/acme/new-acct", web::post().to(new_acct))
            .route("/acme/new-order", web::post().to(new_order))
            .route("/acme/order/{id}", web::post().to(order_status))
            .route("/acme/authz/{id}", web::post().to(authz))
            .route("/acme/challenge/{id}/{num}", web::post().to(challenge))
            .route("/acme/finalize/{order}/{id}", web::post().to(finalize))
            .route("/acme/cert/{id}", web::post().to(certificate))
            .route("/acme/revoke-cert", web::post().to(revoke_cert))
            .route("/renewal-info/{cert_id}", web::get().to(renewal_info))
            .route("/acme/bad-nonce-once", web::post().to(bad_nonce_once))
            .route("/acme/always-rejects", web::post().to(always_rejects))
            .route("/flaky", web::get().to(flaky))
    })
    .workers(1)
    .disable_signals()
    .listen(lst)
    .unwrap()
    .run();

    let handle = server.handle();

    tokio::spawn(server);

    TestServer {
        dir_url,
        base_url,
        state,
        handle,
    }
}

#[tokio::test]
async fn test_server_serves_directory() {
    let server = with_test_server();
    let res = reqwest::get(&server.dir_url).await.unwrap();
    assert!(res.status().is_success());
}

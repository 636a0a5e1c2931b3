//! Integration tests for the HTTP surface and the email pipeline.
//!
//! Each test spins up the Axum app on a random port (plus a stand-in task
//! queue where needed) and drives it over real HTTP with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use featurewatch::api::{AppState, app_routes};
use featurewatch::config::{AppConfig, MailConfig, StagingRedirectConfig};
use featurewatch::error::MailError;
use featurewatch::mail::outbound::enqueue_outbound_email;
use featurewatch::mail::{MailTransport, OutboundEmail, OutboundMailTask};
use featurewatch::store::{Database, LibSqlBackend};
use featurewatch::tasks::{HttpTaskEnqueuer, OUTBOUND_EMAIL_PATH, QUEUE_NAME_HEADER};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const INBOUND: &str = "featurewatch-dev@appspot.gserviceaccount.com";
const USER_HEADER: &str = "X-Authenticated-User-Email";

/// Stub transport that keeps every message instead of sending it.
#[derive(Default)]
struct StubTransport {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl StubTransport {
    fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for StubTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

type QueueLog = Arc<Mutex<Vec<(String, Value)>>>;

async fn record_task(
    State(log): State<QueueLog>,
    Path(path): Path<String>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    log.lock().unwrap().push((format!("/tasks/{path}"), payload));
    Json(json!({"queued": true}))
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Start a stand-in task queue that records every submission.
async fn start_queue() -> (u16, QueueLog) {
    let log: QueueLog = Arc::default();
    let app = Router::new()
        .route("/tasks/{*path}", post(record_task))
        .with_state(Arc::clone(&log));
    (serve(app).await, log)
}

struct TestServer {
    port: u16,
    db: Arc<LibSqlBackend>,
    transport: Arc<StubTransport>,
    queue: QueueLog,
    queue_port: u16,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

/// Start the app on a random port, wired to a stub transport and queue.
async fn start_server(mail: MailConfig) -> TestServer {
    let (queue_port, queue) = start_queue().await;
    let queue_url = format!("http://127.0.0.1:{queue_port}");

    let config = Arc::new(AppConfig {
        port: 0,
        db_path: ":memory:".into(),
        task_queue_url: queue_url.clone(),
        session_header: USER_HEADER.into(),
        mail,
    });
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let transport = Arc::new(StubTransport::default());
    let enqueuer = Arc::new(HttpTaskEnqueuer::new(queue_url));

    let state = AppState::build(config, db.clone(), transport.clone(), enqueuer).unwrap();
    let port = serve(app_routes(state)).await;

    TestServer {
        port,
        db,
        transport,
        queue,
        queue_port,
    }
}

fn sending_config() -> MailConfig {
    MailConfig {
        send_email: true,
        ..MailConfig::default()
    }
}

// ── Stars ────────────────────────────────────────────────────────────

#[tokio::test]
async fn star_toggle_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let feature = server.db.insert_feature("Popover API").await.unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/v0/currentuser/stars"))
            .header(USER_HEADER, "dev@example.com")
            .body(json!({"featureId": feature.id}).to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<Value>().await.unwrap()["message"], "Done");

        let stars: Value = client
            .get(server.url("/api/v0/currentuser/stars"))
            .header(USER_HEADER, "dev@example.com")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stars, json!({"featureIds": [feature.id]}));

        let resp = client
            .post(server.url("/api/v0/currentuser/stars"))
            .header(USER_HEADER, "dev@example.com")
            .json(&json!({"featureId": feature.id, "starred": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let feature = server.db.get_feature(feature.id).await.unwrap().unwrap();
        assert_eq!(feature.star_count, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn star_checks_run_in_order() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let client = reqwest::Client::new();
        let url = server.url("/api/v0/currentuser/stars");

        let bad_id = client
            .post(&url)
            .json(&json!({"featureId": 1.5}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_id.status(), 400);

        let unknown = client
            .post(&url)
            .json(&json!({"featureId": 42}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);

        let feature = server.db.insert_feature("CSS nesting").await.unwrap();
        let anonymous = client
            .post(&url)
            .json(&json!({"featureId": feature.id}))
            .send()
            .await
            .unwrap();
        assert_eq!(anonymous.status(), 400);
    })
    .await
    .expect("test timed out");
}

// ── Outbound ─────────────────────────────────────────────────────────

#[tokio::test]
async fn enqueued_email_is_sent_when_the_queue_delivers_it() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let producer = HttpTaskEnqueuer::new(format!("http://127.0.0.1:{}", server.queue_port));

        let task = OutboundMailTask {
            to: vec!["owner@example.com".into()],
            from_user: Some("reviewer".into()),
            subject: "Intent to ship".into(),
            html_body: "<p>Approved</p>".into(),
            references: Some("<thread@example.com>".into()),
            ..Default::default()
        };
        enqueue_outbound_email(&producer, &task).await.unwrap();

        let (path, payload) = server.queue.lock().unwrap()[0].clone();
        assert_eq!(path, OUTBOUND_EMAIL_PATH);

        // Play the queue's part: deliver the task to its handler.
        let resp = reqwest::Client::new()
            .post(server.url(&path))
            .header(QUEUE_NAME_HEADER, "emailqueue")
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let sent = server.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["owner@example.com"]);
        assert_eq!(
            sent[0].sender.email.to_string(),
            "admin+reviewer@featurewatch-dev.appspotmail.com"
        );
        assert_eq!(sent[0].sender.name.as_deref(), Some("reviewer via Featurewatch"));
        assert_eq!(sent[0].references.as_deref(), Some("<thread@example.com>"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn staging_redirect_rewrites_recipients() {
    timeout(TEST_TIMEOUT, async {
        let mail = MailConfig {
            send_email: true,
            staging: StagingRedirectConfig {
                enabled: true,
                to_template: "{user}+staging@{domain}".into(),
                cc_template: "{user}+cc@{domain}".into(),
                excluded_recipient_list: Vec::new(),
            },
            ..MailConfig::default()
        };
        let server = start_server(mail).await;

        let resp = reqwest::Client::new()
            .post(server.url("/tasks/outbound-email"))
            .header(QUEUE_NAME_HEADER, "emailqueue")
            .json(&json!({
                "to": "a@b.com",
                "cc": ["c@d.com"],
                "subject": "Review",
                "html": "<p>x</p>",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let sent = server.transport.sent();
        assert_eq!(sent[0].to, vec!["a+staging@b.com"]);
        assert_eq!(sent[0].cc, vec!["c+cc@d.com"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn disabled_sending_acknowledges_without_transport() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(MailConfig::default()).await;
        let resp = reqwest::Client::new()
            .post(server.url("/tasks/outbound-email"))
            .header(QUEUE_NAME_HEADER, "emailqueue")
            .json(&json!({"to": ["x@y.com"], "subject": "s", "html": "<p>b</p>"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(server.transport.sent().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── Bounce ───────────────────────────────────────────────────────────

#[tokio::test]
async fn multipart_bounce_marks_pref_and_escalates() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let form = reqwest::multipart::Form::new()
            .text("original-from", "admin@featurewatch-dev.appspotmail.com")
            .text("original-to", "gone@example.com")
            .text("original-subject", "Feature changed")
            .text("original-text", "Details")
            .text("notification-text", "550 5.1.1 User unknown");

        let resp = reqwest::Client::new()
            .post(server.url("/_ah/bounce"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({"message": "Done"}));

        let prefs = server
            .db
            .get_prefs_for_emails(&["gone@example.com".to_string()])
            .await
            .unwrap();
        assert!(prefs[0].bounced);

        let sent = server.transport.sent();
        assert_eq!(sent[0].to, vec!["ops@example.com"]);
        assert_eq!(sent[0].subject, "Mail to 'gone@example.com' bounced");
    })
    .await
    .expect("test timed out");
}

// ── Inbound ──────────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_reply_reaches_the_task_queue() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let raw = concat!(
            "From: Reviewer <reviewer@example.com>\r\n",
            "Subject: Re: Intent to ship\r\n",
            "In-Reply-To: <thread@example.com>\r\n",
            "\r\n",
            "LGTM\r\n",
        );

        let resp = reqwest::Client::new()
            .post(server.url(&format!("/_ah/mail/{INBOUND}")))
            .body(raw)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<Value>().await.unwrap()["message"], "Done");

        let queued = server.queue.lock().unwrap().clone();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].0, "/tasks/detect-intent");
        assert_eq!(queued[0].1["from_addr"], "reviewer@example.com");
        assert_eq!(queued[0].1["in_reply_to"], "<thread@example.com>");
        assert_eq!(queued[0].1["body"].as_str().unwrap().trim(), "LGTM");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn autoresponder_is_acknowledged_but_dropped() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(sending_config()).await;
        let raw = "From: bot@example.com\r\nPrecedence: bulk\r\nSubject: Away\r\n\r\nOOO\r\n";

        let resp = reqwest::Client::new()
            .post(server.url(&format!("/_ah/mail/{INBOUND}")))
            .body(raw)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.json::<Value>().await.unwrap()["message"],
            "Wrong precedence"
        );
        assert!(server.queue.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(MailConfig::default()).await;
        let body: Value = reqwest::get(server.url("/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

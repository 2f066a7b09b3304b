use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rowscope_adapters::http::HttpBackend;
use rowscope_core::catalog::CatalogBackend;
use rowscope_core::error::ApiError;
use rowscope_core::mutation::{MutationBackend, RowPayload};
use rowscope_core::pagination::{PageBackend, PageRequest};
use rowscope_core::query_runner::QueryBackend;
use rowscope_core::row_identity::PrimaryKey;
use rowscope_core::session::{BrowserSession, SessionPhase};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    target: String,
    body: String,
}

impl RecordedRequest {
    fn line(&self) -> String {
        format!("{} {}", self.method, self.target)
    }

    fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body should be json")
    }
}

type Requests = Arc<Mutex<Vec<RecordedRequest>>>;

async fn stub_server(responses: Vec<(u16, &'static str)>) -> (String, Requests) {
    slow_stub_server(responses, Duration::ZERO).await
}

/// Serves the canned responses in order, one connection each, holding every
/// answer back for `delay` after the request arrives.
async fn slow_stub_server(
    responses: Vec<(u16, &'static str)>,
    delay: Duration,
) -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("stub server should bind");
    let address = listener.local_addr().expect("stub server address");
    let requests: Requests = Arc::default();
    let recorded = Arc::clone(&requests);
    let mut queue: VecDeque<_> = responses.into();

    tokio::spawn(async move {
        while let Some((status, body)) = queue.pop_front() {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Some(request) = read_request(&mut stream).await else {
                continue;
            };
            recorded.lock().expect("request log poisoned").push(request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            respond(&mut stream, status, body).await;
        }
    });

    (format!("http://{address}"), requests)
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    let header_end = loop {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + 4 + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    Some(RecordedRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        target: request_line.next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buffer[header_end + 4..]).into_owned(),
    })
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if stream.write_all(response.as_bytes()).await.is_ok() {
        let _ = stream.shutdown().await;
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn recorded(requests: &Requests) -> Vec<RecordedRequest> {
    requests.lock().expect("request log poisoned").clone()
}

const USERS_SCHEMA: &str = r#"[
    {"name":"id","type":"INTEGER","not_null":false,"default_value":null,"primary_key":true},
    {"name":"email","type":"TEXT","not_null":true,"default_value":"''","primary_key":false}
]"#;

#[tokio::test(flavor = "current_thread")]
async fn catalog_and_page_reads_hit_the_api_paths() {
    let (base_url, requests) = stub_server(vec![
        (200, r#"{"readonly":true}"#),
        (200, r#"[{"name":"users","row_count":2}]"#),
        (200, USERS_SCHEMA),
        (
            200,
            r#"{"columns":["id","email"],"rows":[[26,"z@example.com"]],"total":26,"page":2,"limit":25}"#,
        ),
    ])
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");

    let mode = backend.fetch_mode().await.expect("mode should load");
    let tables = backend.list_tables().await.expect("tables should load");
    let columns = backend
        .fetch_schema("users")
        .await
        .expect("schema should load");
    let window = backend
        .fetch_page(&PageRequest {
            table: "users".to_string(),
            page: 2,
            limit: 25,
        })
        .await
        .expect("page should load");

    assert!(mode.readonly);
    assert_eq!(tables[0].name, "users");
    assert_eq!(tables[0].row_count, 2);
    assert!(columns[0].primary_key);
    assert_eq!(columns[1].data_type, "TEXT");
    assert_eq!(columns[1].default_value.as_deref(), Some("''"));
    assert_eq!(window.rows, vec![vec![json!(26), json!("z@example.com")]]);
    assert_eq!(window.total, 26);

    let lines: Vec<String> = recorded(&requests).iter().map(RecordedRequest::line).collect();
    assert_eq!(
        lines,
        vec![
            "GET /api/mode",
            "GET /api/tables",
            "GET /api/tables/users/schema",
            "GET /api/tables/users/data?page=2&limit=25",
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn writes_carry_key_parameters_and_json_bodies() {
    let (base_url, requests) = stub_server(vec![
        (201, r#"{"message":"Row inserted successfully"}"#),
        (200, r#"{"message":"Row updated successfully"}"#),
        (200, r#"{"message":"Row deleted successfully"}"#),
    ])
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");
    let key = PrimaryKey::new("id", json!(42));
    let mut payload = RowPayload::new();
    payload.insert("email".to_string(), json!("new@example.com"));

    backend
        .insert_row("users", &payload)
        .await
        .expect("insert should succeed");
    backend
        .update_row("users", &key, &payload)
        .await
        .expect("update should succeed");
    backend
        .delete_row("users", &key)
        .await
        .expect("delete should succeed");

    let requests = recorded(&requests);
    assert_eq!(requests[0].line(), "POST /api/tables/users/rows");
    assert_eq!(requests[0].json_body(), json!({"email": "new@example.com"}));
    assert_eq!(
        requests[1].line(),
        "PUT /api/tables/users/rows?pk=id&pk_value=42"
    );
    assert_eq!(requests[1].json_body(), json!({"email": "new@example.com"}));
    assert_eq!(
        requests[2].line(),
        "DELETE /api/tables/users/rows?pk=id&pk_value=42"
    );
    assert!(requests[2].body.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn query_text_is_posted_as_json() {
    let (base_url, requests) = stub_server(vec![(
        200,
        r#"{"columns":["n"],"rows":[[1]],"total":1,"page":1,"limit":1}"#,
    )])
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");

    let result = backend
        .run_query("SELECT 1 AS n")
        .await
        .expect("query should succeed");

    assert_eq!(result.columns, vec!["n"]);
    let requests = recorded(&requests);
    assert_eq!(requests[0].line(), "POST /api/query");
    assert_eq!(requests[0].json_body(), json!({"sql": "SELECT 1 AS n"}));
}

#[tokio::test(flavor = "current_thread")]
async fn slow_answers_are_waited_for() {
    let (base_url, requests) = slow_stub_server(
        vec![
            (200, r#"{"columns":["n"],"rows":[[1]]}"#),
            (201, r#"{"message":"Row inserted successfully"}"#),
        ],
        Duration::from_secs(3),
    )
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");

    let result = backend
        .run_query("SELECT slow()")
        .await
        .expect("slow query should still succeed");
    let mut payload = RowPayload::new();
    payload.insert("email".to_string(), json!("late@example.com"));
    backend
        .insert_row("users", &payload)
        .await
        .expect("slow insert should still succeed");

    assert_eq!(result.rows, vec![vec![json!(1)]]);
    assert_eq!(recorded(&requests).len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn error_statuses_map_to_backend_errors() {
    let (base_url, _requests) = stub_server(vec![
        (400, r#"{"error":"duplicate key"}"#),
        (500, "internal failure"),
    ])
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");

    let duplicate = backend
        .insert_row("users", &RowPayload::new())
        .await
        .expect_err("insert should be rejected");
    let opaque = backend
        .list_tables()
        .await
        .expect_err("listing should fail");

    assert_eq!(duplicate, ApiError::backend(400, "duplicate key"));
    assert_eq!(opaque.user_message(), "request failed with status 500");
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    drop(listener);
    let backend = HttpBackend::new(&format!("http://{address}")).expect("url should parse");

    let err = backend
        .fetch_mode()
        .await
        .expect_err("closed port should fail");

    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn session_browses_a_table_over_http() {
    let (base_url, requests) = stub_server(vec![
        (200, r#"{"readonly":false}"#),
        (200, r#"[{"name":"users","row_count":1}]"#),
        (200, USERS_SCHEMA),
        (
            200,
            r#"{"columns":["id","email"],"rows":[[1,"a@example.com"]],"total":1,"page":1,"limit":50}"#,
        ),
    ])
    .await;
    let backend = HttpBackend::new(&base_url).expect("stub url should parse");
    let mut session = BrowserSession::new(backend, 50);

    session.start().await.expect("start should succeed");
    session
        .select_table("users")
        .await
        .expect("selection should succeed");

    let state = session.state();
    assert_eq!(state.phase, SessionPhase::Ready);
    assert_eq!(state.row_count(), 1);
    assert_eq!(recorded(&requests).len(), 4);
}

fn http_integration_enabled() -> bool {
    matches!(
        std::env::var("ROWSCOPE_RUN_HTTP_INTEGRATION")
            .ok()
            .as_deref(),
        Some("1")
    )
}

#[tokio::test(flavor = "current_thread")]
async fn live_backend_catalog_and_first_page() {
    if !http_integration_enabled() {
        return;
    }

    let base_url = std::env::var("ROWSCOPE_TEST_BASE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let backend = HttpBackend::new(&base_url).expect("test base url should parse");

    backend.fetch_mode().await.expect("mode should load");
    let tables = backend.list_tables().await.expect("tables should load");
    let Some(table) = tables.first() else {
        return;
    };

    let columns = backend
        .fetch_schema(&table.name)
        .await
        .expect("schema should load");
    let window = backend
        .fetch_page(&PageRequest {
            table: table.name.clone(),
            page: 1,
            limit: 10,
        })
        .await
        .expect("first page should load");

    assert_eq!(window.columns.len(), columns.len());
    assert!(window.rows.len() <= 10);
}

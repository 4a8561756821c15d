//! End-to-end tests against a live server on an ephemeral port.

use docqa::config::Config;
use docqa::server::{router, AppState};
use reqwest::{multipart, redirect, Client, StatusCode};
use serde_json::Value;
use tempfile::TempDir;

const HANDBOOK: &str = "Employees accrue vacation days monthly. The office closes at six on Fridays.";

struct TestServer {
    base: String,
    _tmp: TempDir,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db.path = tmp.path().join("docqa.sqlite");
    config.uploads.dir = tmp.path().join("uploads");

    let state = AppState::from_config(&config).await.unwrap();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        _tmp: tmp,
    }
}

fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn signup(server: &TestServer, client: &Client, username: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{}/signup", server.base))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .unwrap()
}

async fn login(server: &TestServer, client: &Client, username: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{}/login", server.base))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .unwrap()
}

async fn upload(
    server: &TestServer,
    client: &Client,
    filename: &str,
    body: &[u8],
    query: &str,
) -> reqwest::Response {
    let form = multipart::Form::new()
        .part(
            "file",
            multipart::Part::bytes(body.to_vec()).file_name(filename.to_string()),
        )
        .text("query", query.to_string());
    client
        .post(format!("{}/dashboard", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn get_text(server: &TestServer, client: &Client, path: &str) -> (StatusCode, String) {
    let resp = client
        .get(format!("{}{}", server.base, path))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.text().await.unwrap())
}

async fn signed_in(server: &TestServer, username: &str) -> Client {
    let client = client();
    signup(server, &client, username, "pw-123").await;
    let resp = login(server, &client, username, "pw-123").await;
    assert_eq!(location(&resp), "/dashboard");
    client
}

#[tokio::test]
async fn health_reports_version() {
    let server = start_server().await;
    let body: Value = client()
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn index_redirects_by_session() {
    let server = start_server().await;
    let anon = client();
    let resp = anon.get(format!("{}/", server.base)).send().await.unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/login");

    let user = signed_in(&server, "ines").await;
    let resp = user.get(format!("{}/", server.base)).send().await.unwrap();
    assert_eq!(location(&resp), "/dashboard");
}

#[tokio::test]
async fn signup_then_duplicate_is_flashed() {
    let server = start_server().await;
    let client = client();

    let resp = signup(&server, &client, "rokia", "pw-1").await;
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/login");

    let (_, page) = get_text(&server, &client, "/login").await;
    assert!(page.contains("Account created successfully"));

    // Flashes are consumed once shown.
    let (_, page) = get_text(&server, &client, "/login").await;
    assert!(!page.contains("Account created successfully"));

    let resp = signup(&server, &client, "rokia", "pw-2").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("Username already exists"));
}

#[tokio::test]
async fn bad_password_stays_on_login() {
    let server = start_server().await;
    let client = client();
    signup(&server, &client, "alice", "right").await;

    let resp = login(&server, &client, "alice", "wrong").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("Invalid credentials"));

    let resp = client
        .get(format!("{}/dashboard", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn dashboard_requires_login() {
    let server = start_server().await;
    let anon = client();

    let resp = anon
        .get(format!("{}/dashboard", server.base))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/login");

    let resp = upload(&server, &anon, "notes.txt", HANDBOOK.as_bytes(), "anything").await;
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn disallowed_extension_is_flashed() {
    let server = start_server().await;
    let client = signed_in(&server, "bob").await;

    let resp = upload(&server, &client, "diagram.png", b"\x89PNG", "what is this").await;
    assert_eq!(location(&resp), "/dashboard");

    let (status, page) = get_text(&server, &client, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("File type not allowed"));
    assert!(!page.contains("diagram.png"));
}

#[tokio::test]
async fn empty_query_is_flashed() {
    let server = start_server().await;
    let client = signed_in(&server, "carol").await;

    let resp = upload(&server, &client, "notes.txt", HANDBOOK.as_bytes(), "   ").await;
    assert_eq!(location(&resp), "/dashboard");

    let (_, page) = get_text(&server, &client, "/dashboard").await;
    assert!(page.contains("Please enter a question"));
}

#[tokio::test]
async fn unreadable_pdf_is_flashed_and_not_kept() {
    let server = start_server().await;
    let client = signed_in(&server, "kofi").await;

    let resp = upload(&server, &client, "broken.pdf", b"not a pdf at all", "anything").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("Error processing file: PDF extraction failed"), "page={}", page);
    assert!(!page.contains("Similarity score"));

    let body: Value = client
        .get(format!("{}/browse_files", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn undecodable_text_is_flashed() {
    let server = start_server().await;
    let client = signed_in(&server, "lena").await;

    let resp = upload(&server, &client, "latin1.txt", &[0x63, 0x61, 0x66, 0xe9], "cafe").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("Error processing file: file is not valid UTF-8 text"));
    assert!(!page.contains("latin1.txt"));
}

#[tokio::test]
async fn matching_query_takes_document_branch() {
    let server = start_server().await;
    let client = signed_in(&server, "dana").await;

    let resp = upload(&server, &client, "handbook.txt", HANDBOOK.as_bytes(), HANDBOOK).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("Similarity score: 1.00"), "page={}", page);
    assert!(page.contains("Response based on document content."));
    assert!(page.contains("handbook.txt"));
}

#[tokio::test]
async fn unrelated_query_takes_fallback_branch() {
    let server = start_server().await;
    let client = signed_in(&server, "erin").await;

    let resp = upload(
        &server,
        &client,
        "handbook.txt",
        HANDBOOK.as_bytes(),
        "quantum chromodynamics lattice",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("Similarity score: "));
    assert!(page.contains("The document does not appear to address this query."));
}

#[tokio::test]
async fn logout_ends_session() {
    let server = start_server().await;
    let client = signed_in(&server, "frank").await;

    let resp = client
        .get(format!("{}/logout", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/login");

    let resp = client
        .get(format!("{}/dashboard", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn browse_files_lists_own_uploads() {
    let server = start_server().await;

    let resp = client()
        .get(format!("{}/browse_files", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Login required");

    let client = signed_in(&server, "gina").await;
    upload(&server, &client, "handbook.txt", HANDBOOK.as_bytes(), "vacation").await;

    let body: Value = client
        .get(format!("{}/browse_files", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], "handbook.txt");
    assert!(files[0].get("filepath").is_none());
    assert_eq!(files[0]["content_hash"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn process_query_checks_ownership() {
    let server = start_server().await;

    let owner = signed_in(&server, "hana").await;
    upload(&server, &owner, "handbook.txt", HANDBOOK.as_bytes(), "vacation").await;
    let listing: Value = owner
        .get(format!("{}/browse_files", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let doc_id = listing["files"][0]["id"].as_i64().unwrap();

    let resp = owner
        .post(format!("{}/process_query", server.base))
        .json(&serde_json::json!({ "document_id": doc_id, "query": HANDBOOK }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let analysis: Value = resp.json().await.unwrap();
    assert_eq!(analysis["branch"], "document");
    assert!(analysis["similarity"].as_f64().unwrap() > 0.99);

    let other = signed_in(&server, "ivan").await;
    let resp = other
        .post(format!("{}/process_query", server.base))
        .json(&serde_json::json!({ "document_id": doc_id, "query": "vacation" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Document not found");

    let resp = owner
        .post(format!("{}/process_query", server.base))
        .json(&serde_json::json!({ "document_id": doc_id, "query": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

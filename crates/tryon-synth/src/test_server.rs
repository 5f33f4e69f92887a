//! Loopback axum servers that record what the adapters send.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One multipart part as the server decoded it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub parts: Vec<ReceivedPart>,
}

impl Received {
    pub fn part(&self, name: &str) -> Option<&ReceivedPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn part_names(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.name.as_str()).collect()
    }
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: Bytes,
    log: Arc<Mutex<Vec<Received>>>,
}

impl Canned {
    fn record(&self, received: Received) -> (StatusCode, Bytes) {
        self.log.lock().unwrap().push(received);
        (self.status, self.body.clone())
    }
}

pub struct TestServer {
    pub base: String,
    log: Arc<Mutex<Vec<Received>>>,
}

impl TestServer {
    pub fn requests(&self) -> Vec<Received> {
        self.log.lock().unwrap().clone()
    }
}

/// Answer multipart POSTs on any path with `status` and `body`.
pub async fn serve_form(status: u16, body: &[u8]) -> TestServer {
    serve(status, body, |canned| Router::new().fallback(record_form).with_state(canned)).await
}

/// Answer bodiless requests on any path with `status` and `body`.
pub async fn serve_plain(status: u16, body: &[u8]) -> TestServer {
    serve(status, body, |canned| Router::new().fallback(record_plain).with_state(canned)).await
}

/// Accept requests and never answer them in time.
pub async fn hang() -> String {
    let app = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StatusCode::OK
    });
    spawn(app).await
}

/// A port that nothing is listening on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn serve(status: u16, body: &[u8], router: impl FnOnce(Canned) -> Router) -> TestServer {
    let log = Arc::new(Mutex::new(Vec::new()));
    let canned = Canned {
        status: StatusCode::from_u16(status).unwrap(),
        body: Bytes::copy_from_slice(body),
        log: log.clone(),
    };
    let base = spawn(router(canned)).await;
    TestServer { base, log }
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn record_form(
    State(canned): State<Canned>,
    method: Method,
    uri: Uri,
    mut multipart: Multipart,
) -> (StatusCode, Bytes) {
    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap_or_default().to_vec();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    canned.record(Received {
        method,
        path: uri.path().to_string(),
        parts,
    })
}

async fn record_plain(State(canned): State<Canned>, method: Method, uri: Uri) -> (StatusCode, Bytes) {
    canned.record(Received {
        method,
        path: uri.path().to_string(),
        parts: Vec::new(),
    })
}

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use axum::routing::get;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::io::Error as IoError;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::sleep;
use url_relay::{
    ByteStream, Config, Fetch, ObjectSink, SinkWriter, SourceResponse, UploadError,
};

/// Size limit every test server runs with
pub const TEST_MAX_FILE_SIZE: u64 = 1024;

pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg, but close enough";

/// Test harness that runs the relay service on its own runtime
pub struct TestServer {
    _handle: JoinHandle<()>,
    workspace: TempDir,
    port: u16,
}

impl TestServer {
    pub async fn start() -> Self {
        let workspace = tempfile::tempdir().expect("Failed to create workspace");
        let port = portpicker::pick_unused_port().expect("No available port");

        let config = Config {
            listen_on_port: port,
            environment: "test".into(),
            workspace: workspace.path().to_string_lossy().into_owned(),
            max_file_size: TEST_MAX_FILE_SIZE,
            stall_timeout_secs: 5,
            connect_timeout_secs: 5,
            ..Default::default()
        };
        config.validate().expect("Invalid test configuration");

        // Spawn the server in a separate thread with its own runtime
        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                url_relay::run(config).await.expect("Server failed");
            });
        });

        let server = TestServer {
            _handle: handle,
            workspace,
            port,
        };

        // Poll until server is ready
        let client = server.client();
        for _ in 0..200 {
            if let Ok(response) = client.get(server.url("/health")).send().await
                && response.status().is_success()
            {
                break;
            }

            sleep(Duration::from_millis(10)).await;
        }

        server
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    pub async fn upload(
        &self,
        client: &reqwest::Client,
        source_url: &str,
        destination_dir: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = client
            .post(self.url("/upload-url"))
            .json(&serde_json::json!({
                "sourceUrl": source_url,
                "destinationDir": destination_dir,
            }))
            .send()
            .await
            .expect("Request failed");

        let status = response.status();
        let body = response.json().await.expect("Response is not JSON");
        (status, body)
    }

    /// Files stored under `dir`, relative to the workspace
    pub fn stored_files(&self, dir: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.workspace().join(dir)) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| format!("{dir}/{}", entry.file_name().to_string_lossy()))
            .collect()
    }
}

/// Remote server the relay downloads from
pub struct SourceServer {
    port: u16,
}

impl SourceServer {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/image.jpg", get(|| async { with_type("image/jpeg", JPEG_BYTES) }))
            .route(
                "/notes.txt",
                get(|| async { with_type("text/plain; charset=UTF-8", b"plain notes") }),
            )
            .route(
                "/page.html",
                get(|| async { with_type("text/html", b"<html></html>") }),
            )
            .route(
                "/blob",
                get(|| async { with_type("application/unknown", b"???") }),
            )
            .route("/no-type", get(|| async { Response::new(Body::from("untyped")) }))
            .route(
                "/large.png",
                get(|| async { with_type("image/png", &[7u8; 4096]) }),
            )
            .route("/streamed.png", get(streamed_png))
            .route("/empty.png", get(empty_png))
            .route(
                "/missing",
                get(|| async { StatusCode::NOT_FOUND }),
            );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind source server");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        SourceServer { port }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

fn with_type(content_type: &'static str, body: &'static [u8]) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Chunked body without content-length, larger than the test limit
async fn streamed_png() -> Response<Body> {
    let chunks = stream::iter((0..8).map(|_| Ok::<_, IoError>(Bytes::from(vec![1u8; 512]))));
    let mut response = Response::new(Body::from_stream(chunks));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response
}

async fn empty_png() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response
}

/// Canned source response used by orchestrator tests
#[derive(Clone)]
pub struct CannedSource {
    pub status: StatusCode,
    pub headers: Vec<(header::HeaderName, &'static str)>,
    pub chunks: Option<Vec<Bytes>>,
}

impl CannedSource {
    pub fn ok(content_type: &'static str, body: &'static [u8]) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, leak_len(body.len())),
            ],
            chunks: Some(vec![Bytes::from_static(body)]),
        }
    }

    fn response(&self) -> SourceResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), HeaderValue::from_static(*value));
        }
        let body = self.chunks.clone().map(|chunks| -> ByteStream {
            stream::iter(chunks.into_iter().map(Ok::<_, IoError>)).boxed()
        });

        SourceResponse {
            status: self.status,
            headers,
            body,
        }
    }
}

fn leak_len(len: usize) -> &'static str {
    Box::leak(len.to_string().into_boxed_str())
}

/// Fetcher answering every URL with the same canned response
pub struct StaticFetcher {
    source: CannedSource,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(source: CannedSource) -> Arc<Self> {
        Arc::new(Self {
            source,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<SourceResponse, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.source.response())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkState {
    Open,
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub key: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub state: SinkState,
}

/// In-memory sink that remembers every session
#[derive(Default)]
pub struct RecordingSink {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    fail_complete: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on_complete() -> Arc<Self> {
        Arc::new(Self {
            fail_complete: true,
            ..Default::default()
        })
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectSink for RecordingSink {
    async fn begin_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn SinkWriter>, UploadError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(RecordedUpload {
            key: key.to_string(),
            content_type: content_type.to_string(),
            data: Vec::new(),
            state: SinkState::Open,
        });

        Ok(Box::new(RecordingWriter {
            uploads: self.uploads.clone(),
            index: uploads.len() - 1,
            fail_complete: self.fail_complete,
        }))
    }
}

struct RecordingWriter {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    index: usize,
    fail_complete: bool,
}

impl RecordingWriter {
    fn set_state(&self, state: SinkState) {
        self.uploads.lock().unwrap()[self.index].state = state;
    }
}

#[async_trait]
impl SinkWriter for RecordingWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        self.uploads.lock().unwrap()[self.index]
            .data
            .extend_from_slice(&chunk);
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), UploadError> {
        if self.fail_complete {
            return Err(UploadError::sink("multipart completion rejected"));
        }
        self.set_state(SinkState::Completed);
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), UploadError> {
        self.set_state(SinkState::Aborted);
        Ok(())
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::StatusCode;
use longform_tts::{
    controllers::{program::ProgramController, tts::TtsController},
    domain::{
        audio::{ByteConcatAssembler, ProgramAssembler, ProgramService, ProgramSettings},
        shared::RetryPolicy,
        tts::{JobStore, PipelineSettings, PlainTextEnricher, Publisher, SynthesisClient, TtsService, WorkerPool},
    },
    infrastructure::{
        http::build_router,
        repositories::{LocalObjectStore, ObjectStore, ObjectStoreTextSource},
    },
};
use serde_json::Value;
use tempfile::TempDir;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod api_client;
pub mod stubs;

use api_client::TestClient;
use stubs::StubTtsProvider;

pub const PUBLIC_BASE_URL: &str = "http://files.test";

pub struct TestContext {
    pub client: TestClient,
    pub store: Arc<LocalObjectStore>,
    shutdown: CancellationToken,
    _dir: TempDir,
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            let dir = tempfile::tempdir().expect("Failed to create store dir");
            let store = Arc::new(LocalObjectStore::new(dir.path(), PUBLIC_BASE_URL.to_string()));
            let shutdown = CancellationToken::new();

            let app = create_app(store.clone(), shutdown.clone());

            // Start server
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local addr");
            let base_url = format!("http://{}", addr);

            let server_token = shutdown.clone();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { server_token.cancelled().await })
                    .await
                    .unwrap();
            });

            Self {
                client: TestClient::new(&base_url),
                store,
                shutdown,
                _dir: dir,
            }
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.shutdown.cancel();
        }
    }
}

impl TestContext {
    /// Upload a text chunk the way an ingest step would
    pub async fn upload_text(&self, session_id: &str, index: usize, text: &str) {
        let key = ObjectStoreTextSource::chunk_key(session_id, index);
        self.store
            .put(&key, text.as_bytes().to_vec(), "text/plain")
            .await
            .expect("Failed to upload text chunk");
    }

    /// Poll a session's status until the job leaves the active states
    pub async fn wait_for_job(&self, session_id: &str) -> Value {
        let path = format!("/tts/{}/status", session_id);
        for _ in 0..100 {
            let response = self.client.get(&path).await.unwrap();
            if response.status == StatusCode::OK {
                let body = response.body.clone().unwrap();
                let status = body["status"].as_str().unwrap_or_default().to_string();
                if status == "done" || status == "error" {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job for session {} did not finish", session_id);
    }
}

fn create_app(store: Arc<LocalObjectStore>, shutdown: CancellationToken) -> Router {
    let client = SynthesisClient::new(
        Arc::new(StubTtsProvider),
        Arc::new(PlainTextEnricher),
        Duration::from_secs(5),
        false, // Disable cache in tests
    );
    let publisher = Arc::new(Publisher::new(store.clone(), RetryPolicy::none(), Duration::from_secs(5)));
    let jobs = Arc::new(JobStore::new(Duration::from_secs(600)));

    let tts_service = Arc::new(TtsService::new(
        Arc::new(ObjectStoreTextSource::new(store)),
        WorkerPool::new(Arc::new(client)),
        Arc::new(ByteConcatAssembler),
        publisher.clone(),
        jobs.clone(),
        PipelineSettings::default(),
        shutdown,
    ));
    let program_service = Arc::new(ProgramService::new(
        ProgramAssembler::new(Arc::new(ByteConcatAssembler), ProgramSettings::default()),
        publisher,
        jobs,
        None,
        None,
    ));

    build_router(
        Arc::new(TtsController::new(tts_service)),
        Arc::new(ProgramController::new(program_service)),
    )
}

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use hyper::StatusCode;
use partstream::multipart::{
    BatchUploader, CompleteUploadRequest, CompleteUploadResponse, CoordinatorError,
    CreateUploadRequest, CreateUploadResponse, FileInfo, FileProgress, HttpCoordinator,
    MultipartConfig, MultipartUploader, SignPartRequest, SignPartResponse, UploadCoordinator,
    UploadError, MIN_PART_SIZE,
};
use partstream::transport::{
    build_http_client, ChunkStream, StreamingUploadTransport, TransportSettings,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use common::{payload, text, with_etag, TestServer};

/// Coordinator double that signs part URLs against the test server
struct MockCoordinator {
    base_url: String,
    upload_id: Option<String>,
    created: Mutex<Vec<CreateUploadRequest>>,
    signed: Mutex<Vec<SignPartRequest>>,
    completed: Mutex<Vec<CompleteUploadRequest>>,
}

impl MockCoordinator {
    fn new(server: &TestServer) -> Self {
        Self {
            base_url: server.url(""),
            upload_id: Some("upload-1".to_string()),
            created: Mutex::new(Vec::new()),
            signed: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    fn without_upload_id(mut self) -> Self {
        self.upload_id = None;
        self
    }
}

#[async_trait]
impl UploadCoordinator for MockCoordinator {
    async fn create_upload(
        &self,
        request: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, CoordinatorError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(CreateUploadResponse {
            stored_name: Some(format!("stored-{}", request.file_name)),
            upload_id: self.upload_id.clone(),
        })
    }

    async fn sign_part(&self, request: &SignPartRequest) -> Result<SignPartResponse, CoordinatorError> {
        self.signed.lock().unwrap().push(request.clone());
        Ok(SignPartResponse {
            signed_url: format!(
                "{}/{}?partNumber={}&uploadId={}",
                self.base_url, request.stored_name, request.part_number, request.upload_id
            ),
        })
    }

    async fn complete_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse, CoordinatorError> {
        self.completed.lock().unwrap().push(request.clone());
        Ok(CompleteUploadResponse {
            file_id: format!("file-{}", request.stored_name),
        })
    }
}

fn part_number(target: &str) -> String {
    target
        .split("partNumber=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap_or_default()
        .to_string()
}

/// Object-store double: ETag "etag-<part>" for every part
async fn object_store() -> TestServer {
    TestServer::start(|req| with_etag(&format!("etag-{}", part_number(&req.target)))).await
}

fn uploader(coordinator: MockCoordinator) -> MultipartUploader<MockCoordinator> {
    let transport = StreamingUploadTransport::new(TransportSettings::default());
    MultipartUploader::new(coordinator, transport)
        .with_config(MultipartConfig::default().with_read_chunk_size(1024 * 1024))
}

fn temp_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}

#[tokio::test]
async fn test_parts_are_sized_numbered_and_completed_in_order() {
    let server = object_store().await;
    let size = 2 * MIN_PART_SIZE + 12_345;
    let data = payload(size);
    let file = temp_file(&data);

    let uploader = uploader(MockCoordinator::new(&server));
    let mut progress: Vec<FileProgress> = Vec::new();
    let uploaded = uploader
        .upload_path(file.path(), "project-7", |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(uploaded.parts, 3);
    assert_eq!(uploaded.size, size as u64);

    // Parts reach the store in order, each on its own connection
    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(server.connections(), 3);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.method, "PUT");
        assert_eq!(part_number(&request.target), (i + 1).to_string());
        if i + 1 < requests.len() {
            assert!(request.body.len() >= MIN_PART_SIZE);
        }
    }
    let received: Vec<u8> = requests.iter().flat_map(|r| r.body.iter().copied()).collect();
    assert_eq!(received, data);

    let coordinator = uploader.coordinator();
    let created = coordinator.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].file_size, size as u64);
    assert_eq!(created[0].owner_id, "project-7");

    let signed: Vec<u32> = coordinator
        .signed
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.part_number)
        .collect();
    assert_eq!(signed, vec![1, 2, 3]);

    let completed = coordinator.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].upload_id, "upload-1");
    let parts: Vec<(u32, &str)> = completed[0]
        .parts
        .iter()
        .map(|p| (p.part_number, p.etag.as_str()))
        .collect();
    assert_eq!(parts, vec![(1, "etag-1"), (2, "etag-2"), (3, "etag-3")]);
    assert_eq!(uploaded.file_id, format!("file-{}", completed[0].stored_name));

    // Progress folds part deltas into one running file total
    let summed: u64 = progress.iter().map(|p| p.d_loaded).sum();
    let last = progress.last().unwrap();
    assert_eq!(summed, size as u64);
    assert_eq!(last.loaded, size as u64);
    assert_eq!(last.total, size as u64);
    assert_eq!(last.ratio, 1.0);
    assert!(progress.windows(2).all(|w| w[1].loaded >= w[0].loaded));
}

#[tokio::test]
async fn test_small_file_is_a_single_part() {
    let server = object_store().await;
    let file = temp_file(&payload(1000));

    let uploader = uploader(MockCoordinator::new(&server));
    let uploaded = uploader.upload_path(file.path(), "o", |_| {}).await.unwrap();

    assert_eq!(uploaded.parts, 1);
    assert_eq!(server.requests().len(), 1);
    assert_eq!(server.requests()[0].body.len(), 1000);
}

#[tokio::test]
async fn test_empty_file_is_one_empty_part() {
    let server = object_store().await;
    let file = temp_file(&[]);

    let uploader = uploader(MockCoordinator::new(&server));
    let uploaded = uploader.upload_path(file.path(), "o", |_| {}).await.unwrap();

    assert_eq!(uploaded.parts, 1);
    assert_eq!(uploaded.size, 0);
    assert!(server.requests()[0].body.is_empty());
    assert_eq!(uploader.coordinator().completed.lock().unwrap()[0].parts.len(), 1);
}

#[tokio::test]
async fn test_missing_upload_id_fails_before_any_bytes() {
    let server = object_store().await;
    let file = temp_file(&payload(1000));

    let uploader = uploader(MockCoordinator::new(&server).without_upload_id());
    let result = uploader.upload_path(file.path(), "o", |_| {}).await;

    assert!(matches!(result, Err(UploadError::MissingUploadId { .. })));
    assert!(server.requests().is_empty());
    assert!(uploader.coordinator().signed.lock().unwrap().is_empty());
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_part_failure_aborts_before_completion() {
    let server = TestServer::start(|req| {
        if part_number(&req.target) == "2" {
            text(StatusCode::SERVICE_UNAVAILABLE, "slow down")
        } else {
            with_etag("ok")
        }
    })
    .await;
    let file = temp_file(&payload(3 * MIN_PART_SIZE));

    let uploader = uploader(MockCoordinator::new(&server));
    let result = uploader.upload_path(file.path(), "o", |_| {}).await;

    match result {
        Err(UploadError::PartRejected {
            part_number,
            status,
            body,
        }) => {
            assert_eq!(part_number, 2);
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected part rejection, got {:?}", other),
    }

    // Part 3 is never attempted and completion is never requested
    assert_eq!(server.requests().len(), 2);
    assert_eq!(uploader.coordinator().signed.lock().unwrap().len(), 2);
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_etag_is_fatal() {
    let server = TestServer::start(|_| text(StatusCode::OK, "")).await;
    let file = temp_file(&payload(10));

    let uploader = uploader(MockCoordinator::new(&server));
    let result = uploader.upload_path(file.path(), "o", |_| {}).await;

    assert!(matches!(result, Err(UploadError::MissingEtag { part_number: 1 })));
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_grouped_progress_sums_individual_files() {
    let server = object_store().await;
    let first = temp_file(&payload(MIN_PART_SIZE + 10));
    let second = temp_file(&payload(4096));
    let paths: Vec<PathBuf> = vec![first.path().to_path_buf(), second.path().to_path_buf()];
    let expected_total = (MIN_PART_SIZE + 10 + 4096) as u64;

    let batch = BatchUploader::new(uploader(MockCoordinator::new(&server)));
    let mut snapshots = Vec::new();
    let uploaded = batch
        .upload_files(&paths, "o", |event| snapshots.push(event.clone()))
        .await
        .unwrap();

    assert_eq!(uploaded.len(), 2);
    assert!(!snapshots.is_empty());
    for snapshot in &snapshots {
        let individual_sum: u64 = snapshot.individual.values().map(|e| e.loaded).sum();
        assert_eq!(snapshot.overall.loaded, individual_sum);
        assert_eq!(snapshot.overall.total, expected_total);
        assert_eq!(snapshot.individual.len(), 2);
    }

    let last = snapshots.last().unwrap();
    assert_eq!(last.overall.loaded, expected_total);
    assert_eq!(last.overall.ratio, 1.0);
}

fn declared(size: u64) -> FileInfo {
    FileInfo {
        name: "data.bin".to_string(),
        size,
        mime_type: "application/octet-stream".to_string(),
        last_modified: Utc::now(),
    }
}

fn chunks_of(sizes: &[usize]) -> ChunkStream {
    let chunks: Vec<std::io::Result<Bytes>> = sizes
        .iter()
        .map(|&size| Ok(Bytes::from(payload(size))))
        .collect();
    futures::stream::iter(chunks).boxed()
}

#[tokio::test]
async fn test_source_longer_than_declared_size_is_never_completed() {
    let server = object_store().await;
    let uploader = uploader(MockCoordinator::new(&server));

    let mut progress: Vec<FileProgress> = Vec::new();
    let result = uploader
        .upload(&declared(10), chunks_of(&[25]), "o", |p| progress.push(p))
        .await;

    assert!(matches!(
        result,
        Err(UploadError::SizeMismatch { declared: 10, actual: 25, .. })
    ));
    assert!(server.requests().is_empty());
    assert!(progress.iter().all(|p| p.loaded <= p.total));
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_source_stops_before_the_overflowing_part() {
    let server = object_store().await;
    let uploader = uploader(MockCoordinator::new(&server));

    // First part flushes at exactly the declared size; the extra chunk overflows
    let result = uploader
        .upload(
            &declared(MIN_PART_SIZE as u64),
            chunks_of(&[MIN_PART_SIZE, 1]),
            "o",
            |_| {},
        )
        .await;

    assert!(matches!(
        result,
        Err(UploadError::SizeMismatch { actual, .. }) if actual == MIN_PART_SIZE as u64 + 1
    ));
    assert_eq!(server.requests().len(), 1);
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_source_shorter_than_declared_size_is_never_completed() {
    let server = object_store().await;
    let uploader = uploader(MockCoordinator::new(&server));

    let result = uploader
        .upload(&declared(100), chunks_of(&[40]), "o", |_| {})
        .await;

    assert!(matches!(
        result,
        Err(UploadError::SizeMismatch { declared: 100, actual: 40, .. })
    ));
    assert!(server.requests().is_empty());
    assert!(uploader.coordinator().completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_http_coordinator_rejects_empty_signed_url() {
    let server = TestServer::start(|req| {
        if req.target == "/uploads/sign-part" {
            text(StatusCode::OK, r#"{"signedUrl":""}"#)
        } else {
            text(StatusCode::OK, r#"{"storedName":"s.bin","uploadId":"u-1"}"#)
        }
    })
    .await;
    let client = build_http_client(&TransportSettings::default()).unwrap();
    let coordinator = HttpCoordinator::new(client, server.url("")).with_token(Some("t".into()));

    let created = coordinator
        .create_upload(&CreateUploadRequest::new(&declared(1), "o"))
        .await
        .unwrap();
    assert_eq!(created.upload_id.as_deref(), Some("u-1"));

    let result = coordinator
        .sign_part(&SignPartRequest {
            stored_name: "s.bin".to_string(),
            upload_id: "u-1".to_string(),
            part_number: 1,
        })
        .await;
    assert!(matches!(result, Err(CoordinatorError::MissingField("signedUrl"))));

    let requests = server.requests();
    assert_eq!(requests[0].header("authorization"), Some("Bearer t"));
    assert_eq!(requests[1].target, "/uploads/sign-part");
}

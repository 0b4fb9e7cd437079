// Service tests against the on-disk stores
//
// Exercises the fetch-signature / upload-delta exchange with the same
// LocalContentStore + SQLite pairing the CLI repository uses.

use deltasync::config::Config;
use deltasync::delta::generate_delta;
use deltasync::integrity::ChecksumType;
use deltasync::service::{BlockOperation, DeltaSyncService, DeltaUploadRequest};
use deltasync::store::{LocalContentStore, SqliteVersionRepository, VersionRepository};
use deltasync::DeltaError;
use std::path::Path;
use tempfile::TempDir;

type Service = DeltaSyncService<LocalContentStore, SqliteVersionRepository>;

fn open(root: &Path) -> Service {
    let store = LocalContentStore::new(root.join("objects"));
    let versions =
        SqliteVersionRepository::open(&root.join(SqliteVersionRepository::DB_FILE)).unwrap();
    DeltaSyncService::new(store, versions, Config::default())
}

fn document(lines: usize) -> Vec<u8> {
    (0..lines)
        .map(|i| format!("line {:05}: the quick brown fox\n", i))
        .collect::<String>()
        .into_bytes()
}

async fn delta_request(service: &Service, item: &str, new: &[u8], block_size: usize) -> DeltaUploadRequest {
    let response = service.fetch_signature(item, Some(block_size)).await.unwrap();
    let base_version = response.version_number;
    let signature = response.into_signature().unwrap();
    let delta = generate_delta(&signature, new).unwrap();
    let checksum = ChecksumType::Cryptographic.compute(new).to_hex();
    DeltaUploadRequest::from_delta(base_version, &delta, checksum)
}

#[tokio::test]
async fn test_edit_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let service = open(dir.path());

    let v1 = document(500);
    service.upload_full("notes", v1.clone()).await.unwrap();

    let mut v2 = v1.clone();
    v2.splice(4000..4010, b"EDITED HERE, LONGER THAN BEFORE".iter().copied());

    let request = delta_request(&service, "notes", &v2, 256).await;
    let literal_blocks = request
        .blocks
        .iter()
        .filter(|b| b.operation == BlockOperation::Insert)
        .count();
    assert_eq!(literal_blocks, 1);

    let response = service.upload_delta("notes", request).await.unwrap();
    assert!(response.success);
    assert_eq!(response.new_version, 2);
    assert_eq!(response.new_checksum, ChecksumType::Cryptographic.compute(&v2).to_hex());

    let (record, stored) = service.download("notes", None).await.unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(stored, v2);

    // Base version stays retrievable
    let (_, original) = service.download("notes", Some(1)).await.unwrap();
    assert_eq!(original, v1);
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let service = open(dir.path());
        service.upload_full("doc", b"first".to_vec()).await.unwrap();
        service.upload_full("doc", b"second".to_vec()).await.unwrap();
    }

    let service = open(dir.path());
    let (record, data) = service.download("doc", None).await.unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(data, b"second");
}

#[tokio::test]
async fn test_checksum_mismatch_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let service = open(dir.path());
    let v1 = document(100);
    service.upload_full("doc", v1.clone()).await.unwrap();

    let mut v2 = v1.clone();
    v2.extend_from_slice(b"tail");
    let mut request = delta_request(&service, "doc", &v2, 64).await;
    request.new_checksum = ChecksumType::Cryptographic.compute(b"something else").to_hex();

    let err = service.upload_delta("doc", request).await.unwrap_err();
    assert!(matches!(err, DeltaError::ChecksumMismatch { .. }));
    assert!(err.is_retryable_with_full_upload());

    let versions = SqliteVersionRepository::open(&dir.path().join(SqliteVersionRepository::DB_FILE)).unwrap();
    assert_eq!(versions.latest("doc").await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn test_delta_against_older_base_becomes_latest() {
    let dir = TempDir::new().unwrap();
    let service = open(dir.path());
    let v1 = document(200);
    service.upload_full("doc", v1.clone()).await.unwrap();

    // Computed against v1, uploaded after someone else stored v2
    let mut edited = v1.clone();
    edited.extend_from_slice(b"client edit\n");
    let request = delta_request(&service, "doc", &edited, 128).await;
    service.upload_full("doc", b"concurrent writer".to_vec()).await.unwrap();

    let response = service.upload_delta("doc", request).await.unwrap();
    assert_eq!(response.new_version, 3);

    let (_, data) = service.download("doc", None).await.unwrap();
    assert_eq!(data, edited);
}

#[tokio::test]
async fn test_copy_beyond_base_is_stale() {
    let dir = TempDir::new().unwrap();
    let service = open(dir.path());
    service.upload_full("doc", vec![7u8; 1000]).await.unwrap();

    let mut request = delta_request(&service, "doc", &[7u8; 1000], 100).await;
    request.blocks[0].source_index = Some(10);

    let err = service.upload_delta("doc", request).await.unwrap_err();
    assert!(matches!(err, DeltaError::StaleBaseVersion { .. }), "got {:?}", err);

    let (record, _) = service.download("doc", None).await.unwrap();
    assert_eq!(record.version, 1);
}

#[tokio::test]
async fn test_signature_without_file_size_still_syncs() {
    let dir = TempDir::new().unwrap();
    let service = open(dir.path());
    let v1 = document(50);
    service.upload_full("doc", v1.clone()).await.unwrap();

    // A server that omits fileSize from the signature response
    let mut json = serde_json::to_value(service.fetch_signature("doc", Some(300)).await.unwrap()).unwrap();
    json.as_object_mut().unwrap().remove("fileSize");
    let response: deltasync::service::SignatureResponse = serde_json::from_value(json).unwrap();

    let mut v2 = v1.clone();
    v2.extend_from_slice(b"one more line\n");
    let base_version = response.version_number;
    let delta = generate_delta(&response.into_signature().unwrap(), &v2).unwrap();
    let checksum = ChecksumType::Cryptographic.compute(&v2).to_hex();
    let request = DeltaUploadRequest::from_delta(base_version, &delta, checksum);

    let result = service.upload_delta("doc", request).await.unwrap();
    assert_eq!(result.new_version, 2);
    let (_, stored) = service.download("doc", None).await.unwrap();
    assert_eq!(stored, v2);
}

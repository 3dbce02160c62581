use crate::common::{
    collection_page, listing_page, open_store, tag_first_page, tag_index_page, test_config,
};
use gallery_harvest::crawler::{Coordinator, RunOutcome};
use gallery_harvest::storage::{
    CollectionRecord, CollectionStatistics, CollectionStatus, DownloadTask, SqliteStorage,
    Storage, StorageError, StorageResult,
};
use gallery_harvest::url::ImageUrlTemplate;
use gallery_harvest::HarvestError;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Two tags; tag "a" lists collections 101 and 102, tag "b" lists 102 again
async fn mount_site(server: &MockServer) {
    let base = server.uri();

    mount_page(server, "/zhuanti/", tag_index_page(&["a", "b"])).await;
    mount_page(server, "/tag/a/", tag_first_page("a", 1)).await;
    mount_page(server, "/tag/a/page/1/", listing_page(&["101", "102"])).await;
    mount_page(server, "/tag/b/", tag_first_page("b", 1)).await;
    mount_page(server, "/tag/b/page/1/", listing_page(&["102"])).await;
    mount_page(
        server,
        "/101",
        collection_page("Alpha", 3, &format!("{}/img/2020/09/27a01.jpg", base)),
    )
    .await;
    mount_page(
        server,
        "/102",
        collection_page("Beta: Two", 2, &format!("{}/img/2021/01/05b01.jpg", base)),
    )
    .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/img/.*\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xABu8; 128]))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

fn file_count(folder: &Path) -> usize {
    std::fs::read_dir(folder).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_full_run_downloads_every_collection() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server, dir.path());
    let coordinator = Coordinator::new(config).unwrap();

    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(summary.bootstrapped);
    assert_eq!(summary.tag_pages_processed, 2);
    assert_eq!(summary.identifiers_processed, 2);
    assert_eq!(summary.collections_downloaded, 2);
    assert_eq!(summary.collections_abandoned, 0);

    let downloads = dir.path().join("downloads");
    assert_eq!(file_count(&downloads.join("Alpha")), 3);
    assert_eq!(file_count(&downloads.join("Beta Two")), 2);
    assert!(downloads.join("Beta Two").join("05b02.jpg").exists());

    let storage = coordinator.storage();
    assert_eq!(
        storage.statistics().unwrap(),
        CollectionStatistics {
            total: 2,
            with_metadata: 2,
            downloaded: 2,
            total_images: 5,
        }
    );

    // 102 appears on both tags but is processed once
    assert_eq!(requests_to(&server, "/102").await, 1);
}

#[tokio::test]
async fn test_concurrent_tag_discovery() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.bootstrap.known_identifier_threshold = 0;
    config.workers.number = 2;
    config.workers.info = 2;
    let coordinator = Coordinator::new(config).unwrap();

    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(!summary.bootstrapped);
    assert_eq!(summary.collections_downloaded, 2);
    assert_eq!(coordinator.storage().statistics().unwrap().downloaded, 2);
}

#[tokio::test]
async fn test_second_run_only_fetches_new_work() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    {
        let coordinator = Coordinator::new(test_config(&server, dir.path())).unwrap();
        coordinator.run(CancellationToken::new()).await.unwrap();
    }

    let coordinator = Coordinator::new(test_config(&server, dir.path())).unwrap();
    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.identifiers_processed, 0);
    assert_eq!(summary.collections_downloaded, 0);
    assert_eq!(requests_to(&server, "/101").await, 1);
    assert_eq!(requests_to(&server, "/img/2020/09/27a01.jpg").await, 1);
}

#[tokio::test]
async fn test_pending_work_is_resumed() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    {
        // An earlier run recorded both identifiers but stopped before fetching metadata
        let storage = open_store(dir.path());
        let identifiers: BTreeSet<String> =
            ["101".to_string(), "102".to_string()].into_iter().collect();
        storage.insert_new(&identifiers).unwrap();
    }

    let mut config = test_config(&server, dir.path());
    // Tag index is unavailable this time
    config.site.tag_index_path = "missing/".to_string();
    let coordinator = Coordinator::new(config).unwrap();

    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.tag_pages_processed, 0);
    assert_eq!(summary.identifiers_processed, 2);
    assert_eq!(summary.collections_downloaded, 2);
    assert_eq!(
        file_count(&dir.path().join("downloads").join("Alpha")),
        3
    );
}

fn stored_record(
    server: &MockServer,
    identifier: &str,
    name: &str,
    stem: &str,
    count: u32,
) -> CollectionRecord {
    CollectionRecord {
        identifier: identifier.to_string(),
        name: name.to_string(),
        image_count: count,
        template: ImageUrlTemplate {
            prefix: format!("{}/img/{}", server.uri(), stem),
            suffix: ".jpg".to_string(),
            index_width: 2,
        },
        date: None,
        tag_names: vec![],
    }
}

#[tokio::test]
async fn test_resume_picks_up_each_pending_state() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    {
        let storage = open_store(dir.path());
        let identifiers: BTreeSet<String> = ["101", "102", "103"]
            .iter()
            .map(|id| id.to_string())
            .collect();
        storage.insert_new(&identifiers).unwrap();

        // 101 has no metadata, 102 has metadata only, 103 is complete
        storage
            .save_metadata(&stored_record(&server, "102", "Beta: Two", "2021/01/05b", 2))
            .unwrap();
        storage
            .save_metadata(&stored_record(&server, "103", "Gamma", "2019/03/11c", 4))
            .unwrap();
        storage.mark_downloaded("103").unwrap();
    }

    let mut config = test_config(&server, dir.path());
    config.site.tag_index_path = "missing/".to_string();
    let coordinator = Coordinator::new(config).unwrap();

    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.identifiers_processed, 1);
    assert_eq!(summary.collections_downloaded, 2);

    assert_eq!(requests_to(&server, "/101").await, 1);
    assert_eq!(requests_to(&server, "/102").await, 0);
    assert_eq!(requests_to(&server, "/103").await, 0);
    assert_eq!(requests_to(&server, "/img/2021/01/05b02.jpg").await, 1);
    for index in 1..=4 {
        let image = format!("/img/2019/03/11c{:02}.jpg", index);
        assert_eq!(requests_to(&server, &image).await, 0);
    }

    let downloads = dir.path().join("downloads");
    assert_eq!(file_count(&downloads.join("Alpha")), 3);
    assert_eq!(file_count(&downloads.join("Beta Two")), 2);
    assert!(!downloads.join("Gamma").exists());
    assert_eq!(coordinator.storage().statistics().unwrap().downloaded, 3);
}

#[tokio::test]
async fn test_cancelled_run_is_interrupted() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(test_config(&server, dir.path())).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = coordinator.run(cancel).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.collections_downloaded, 0);
}

#[tokio::test]
async fn test_terminal_tag_stops_discovery() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.site.terminal_tag = "a".to_string();
    let coordinator = Coordinator::new(config).unwrap();

    let summary = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.tag_pages_processed, 1);
    assert_eq!(requests_to(&server, "/tag/b/").await, 0);
}

/// Store whose identifier inserts always fail
struct BrokenStorage {
    inner: SqliteStorage,
}

impl Storage for BrokenStorage {
    fn exists(&self, identifier: &str) -> StorageResult<bool> {
        self.inner.exists(identifier)
    }

    fn all_known_identifiers(&self) -> StorageResult<HashSet<String>> {
        self.inner.all_known_identifiers()
    }

    fn insert_new(&self, _identifiers: &BTreeSet<String>) -> StorageResult<Vec<String>> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn pending_metadata(&self) -> StorageResult<Vec<String>> {
        self.inner.pending_metadata()
    }

    fn pending_downloads(&self) -> StorageResult<Vec<DownloadTask>> {
        self.inner.pending_downloads()
    }

    fn save_metadata(&self, record: &CollectionRecord) -> StorageResult<()> {
        self.inner.save_metadata(record)
    }

    fn mark_downloaded(&self, identifier: &str) -> StorageResult<()> {
        self.inner.mark_downloaded(identifier)
    }

    fn reset_download_flags(&self) -> StorageResult<usize> {
        self.inner.reset_download_flags()
    }

    fn status(&self, identifier: &str) -> StorageResult<Option<CollectionStatus>> {
        self.inner.status(identifier)
    }

    fn statistics(&self) -> StorageResult<CollectionStatistics> {
        self.inner.statistics()
    }
}

#[tokio::test]
async fn test_storage_failure_aborts_run() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let storage = BrokenStorage {
        inner: SqliteStorage::new(&dir.path().join("harvest.db")).unwrap(),
    };
    let coordinator =
        Coordinator::with_storage(test_config(&server, dir.path()), Arc::new(storage)).unwrap();

    let result = coordinator.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(HarvestError::Storage(_))));
    assert_eq!(requests_to(&server, "/101").await, 0);
}

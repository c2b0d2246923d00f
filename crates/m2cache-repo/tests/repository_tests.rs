//! Integration tests against a mock remote repository

use sha1::{Digest, Sha1};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use m2cache_core::{Archive, Program, Revision};
use m2cache_repo::{
    ChecksumTransfer, HttpTransport, ReleaseOptions, ReleaseOutcome, RepoError, RepositoryCache,
    TransferPolicy,
};

const WIDGET_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.acme</groupId>
  <artifactId>widget</artifactId>
  <versioning>
    <latest>1.1</latest>
    <release>1.1</release>
    <versions>
      <version>1.0</version>
      <version>1.1</version>
    </versions>
    <lastUpdated>20240101120000</lastUpdated>
  </versioning>
</metadata>
"#;

const JAR: &[u8] = b"PK\x03\x04 widget classes";

/// Helper to build a cache against a mock server
fn cache(server: &MockServer, root: &Path) -> RepositoryCache {
    cache_with_stale_time(server, root, Duration::from_secs(24 * 60 * 60))
}

fn cache_with_stale_time(server: &MockServer, root: &Path, stale_time: Duration) -> RepositoryCache {
    let transfer = ChecksumTransfer::new(
        HttpTransport::public().unwrap(),
        &server.uri(),
        TransferPolicy::immediate(),
    )
    .unwrap();
    RepositoryCache::new(root, transfer, stale_time)
}

fn widget() -> Program {
    Program::new("com.acme", "widget").unwrap()
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

async fn serve(server: &MockServer, remote: &str, body: impl Into<Vec<u8>>, times: u64) {
    Mock::given(method("GET"))
        .and(path(remote))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .expect(times)
        .mount(server)
        .await;
}

mod resolve {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_widget() {
        let server = MockServer::start().await;
        serve(&server, "/com/acme/widget/maven-metadata.xml", WIDGET_METADATA, 1).await;
        serve(&server, "/com/acme/widget/1.0/widget-1.0.jar", JAR, 1).await;
        serve(
            &server,
            "/com/acme/widget/1.0/widget-1.0.jar.sha1",
            sha1_hex(JAR),
            1,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());

        let revisions = cache.revisions(&widget()).await.unwrap();
        let versions: Vec<_> = revisions.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0", "1.1"]);

        let file = cache
            .get(&revisions[0].archive("jar", None))
            .await
            .unwrap()
            .expect("widget 1.0 should be fetched");
        assert!(file.ends_with("widget-1.0.jar"));
        assert_eq!(std::fs::read(&file).unwrap(), JAR);
        assert_eq!(
            std::fs::read_to_string(file.with_file_name("widget-1.0.jar.sha1")).unwrap(),
            sha1_hex(JAR)
        );
    }

    #[tokio::test]
    async fn test_release_archive_is_fetched_once() {
        let server = MockServer::start().await;
        serve(&server, "/com/acme/widget/1.0/widget-1.0.jar", JAR, 1).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let archive = widget().version("1.0").archive("jar", None);

        let first = cache.get(&archive).await.unwrap().unwrap();
        let second = cache.get(&archive).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stale_release_archive_is_not_refetched() {
        let server = MockServer::start().await;
        serve(&server, "/com/acme/widget/1.0/widget-1.0.jar", JAR, 1).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_stale_time(&server, dir.path(), Duration::ZERO);
        let archive = widget().version("1.0").archive("jar", None);

        cache.get(&archive).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let file = cache.get(&archive).await.unwrap().unwrap();
        assert!(cache.metadata().is_stale(&file));
    }

    #[tokio::test]
    async fn test_stale_snapshot_archive_is_refetched() {
        let server = MockServer::start().await;
        let remote = "/com/acme/widget/1.0.0-SNAPSHOT/widget-1.0.0-20240101.120000-3.jar";
        serve(&server, remote, JAR, 2).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_stale_time(&server, dir.path(), Duration::ZERO);
        let archive: Archive = "com.acme:widget:1.0.0-20240101.120000-3".parse().unwrap();
        assert!(archive.is_snapshot());

        cache.get(&archive).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let file = cache.get(&archive).await.unwrap().unwrap();
        assert_eq!(std::fs::read(file).unwrap(), JAR);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_fatal() {
        let server = MockServer::start().await;
        serve(&server, "/com/acme/widget/1.0/widget-1.0.jar", JAR, 1).await;
        serve(
            &server,
            "/com/acme/widget/1.0/widget-1.0.jar.sha1",
            sha1_hex(b"something else"),
            1,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let archive = widget().version("1.0").archive("jar", None);

        let err = cache.get(&archive).await.unwrap_err();
        assert!(matches!(err, RepoError::ChecksumMismatch { .. }));
        let local = archive.local_path(dir.path());
        assert!(!local.with_file_name("widget-1.0.jar.sha1").exists());
    }

    #[tokio::test]
    async fn test_snapshot_resolution() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/com/acme/widget/1.0.0-SNAPSHOT/maven-metadata.xml",
            r#"<metadata><versioning><snapshot><timestamp>20240101.120000</timestamp><buildNumber>3</buildNumber></snapshot></versioning></metadata>"#,
            1,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let archive = widget().version("1.0.0-SNAPSHOT").archive("jar", None);

        let resolved = cache.resolve_snapshot(&archive).await.unwrap();
        assert_eq!(resolved.file_version().as_str(), "1.0.0-20240101.120000-3");
        // cached, no second request
        let again = cache.resolve_snapshot(&archive).await.unwrap();
        assert_eq!(again, resolved);
    }
}

mod release {
    use super::*;

    fn accept_puts() -> Mock {
        Mock::given(method("PUT")).respond_with(ResponseTemplate::new(201))
    }

    async fn stage_three(
        cache: &RepositoryCache,
        revision: &Revision,
        options: ReleaseOptions,
    ) -> m2cache_repo::Result<ReleaseOutcome> {
        let mut tx = cache.release(revision, options)?;
        tx.add(&revision.pom(), &mut "<project/>".as_bytes())?;
        tx.add(&revision.archive("jar", None), &mut &JAR[..])?;
        tx.add(&revision.archive("jar", Some("sources")), &mut &b"sources"[..])?;
        tx.close().await
    }

    #[tokio::test]
    async fn test_release_publishes_and_records_version() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let outcome = stage_three(&cache, &revision, ReleaseOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::Committed);

        let target = dir.path().join("com/acme/widget/2.0");
        assert!(target.join("widget-2.0.pom").is_file());
        assert!(target.join("widget-2.0-sources.jar").is_file());

        let requests = server.received_requests().await.unwrap();
        let uploaded: Vec<_> = requests
            .iter()
            .filter(|r| r.method.as_str() == "PUT")
            .map(|r| r.url.path().to_string())
            .collect();
        assert!(uploaded.contains(&"/com/acme/widget/2.0/widget-2.0.jar".to_string()));
        assert!(uploaded.contains(&"/com/acme/widget/2.0/widget-2.0.jar.sha1".to_string()));

        let metadata_put = requests
            .iter()
            .find(|r| {
                r.method.as_str() == "PUT" && r.url.path() == "/com/acme/widget/maven-metadata.xml"
            })
            .unwrap();
        let body = String::from_utf8_lossy(&metadata_put.body);
        assert!(body.contains("<version>2.0</version>"));
        assert!(body.contains("<release>2.0</release>"));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_local_revision() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/2.0/widget-2.0.jar"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        // the first file is removed again, and the failing one just in case
        Mock::given(method("DELETE"))
            .and(path("/com/acme/widget/2.0/widget-2.0.pom"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/com/acme/widget/2.0/widget-2.0.jar"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        // the third file is never sent
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/2.0/widget-2.0-sources.jar"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let err = stage_three(&cache, &revision, ReleaseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::RemoteRequestFailed { status: 500, .. }));
        assert!(!dir.path().join(revision.path()).exists());
        assert!(cache.last_updated(&revision).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_leaves_no_checksums_behind() {
        let server = MockServer::start().await;
        let jar = "/com/acme/widget/2.0/widget-2.0.jar";
        Mock::given(method("PUT"))
            .and(path(jar))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{}.sha1", jar)))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(jar))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}.sha1", jar)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let mut tx = cache.release(&revision, ReleaseOptions::default()).unwrap();
        tx.add(&revision.archive("jar", None), &mut &JAR[..]).unwrap();
        let err = tx.close().await.unwrap_err();
        assert!(matches!(err, RepoError::RemoteRequestFailed { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_metadata_update_survives_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(201))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let mut tx = cache.release(&revision, ReleaseOptions::default()).unwrap();
        tx.add(&revision.pom(), &mut "<project/>".as_bytes()).unwrap();
        assert_eq!(tx.close().await.unwrap(), ReleaseOutcome::Committed);
        assert!(dir.path().join(revision.pom().path()).exists());
    }

    #[tokio::test]
    async fn test_conflict_is_reported_after_four_attempts() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/com/acme/widget/maven-metadata.xml",
            WIDGET_METADATA.replace(
                "<version>1.1</version>",
                "<version>1.1</version>\n      <version>2.0</version>",
            ),
            4,
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(201))
            .with_priority(1)
            .expect(0)
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let mut tx = cache.release(&revision, ReleaseOptions::default()).unwrap();
        tx.add(&revision.pom(), &mut "<project/>".as_bytes()).unwrap();
        let err = tx.close().await.unwrap_err();
        assert!(matches!(err, RepoError::VersionAlreadyPublished { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_release_conflict() {
        let server = MockServer::start().await;
        // nothing published when the first transaction checks
        Mock::given(method("GET"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        // afterwards the remote lists 2.0
        Mock::given(method("GET"))
            .and(path("/com/acme/widget/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_METADATA.replace(
                "<version>1.1</version>",
                "<version>1.1</version>\n      <version>2.0</version>",
            )))
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("2.0");

        let mut first = cache.release(&revision, ReleaseOptions::default()).unwrap();
        let mut second = cache.release(&revision, ReleaseOptions::default()).unwrap();
        first.add(&revision.pom(), &mut "<project/>".as_bytes()).unwrap();
        second.add(&revision.pom(), &mut "<project/>".as_bytes()).unwrap();

        assert_eq!(first.close().await.unwrap(), ReleaseOutcome::Committed);
        let err = second.close().await.unwrap_err();
        assert!(matches!(err, RepoError::VersionAlreadyPublished { .. }));
    }

    #[tokio::test]
    async fn test_forced_release_ignores_published_version() {
        let server = MockServer::start().await;
        serve(&server, "/com/acme/widget/maven-metadata.xml", WIDGET_METADATA, 1).await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("1.1");
        let forced = ReleaseOptions {
            force: true,
            local_only: false,
        };

        let mut tx = cache.release(&revision, forced).unwrap();
        tx.add(&revision.pom(), &mut "<project/>".as_bytes()).unwrap();
        assert_eq!(tx.close().await.unwrap(), ReleaseOutcome::Committed);
    }

    #[tokio::test]
    async fn test_snapshot_release_updates_revision_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/com/acme/widget/1.0.0-SNAPSHOT/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        accept_puts().mount(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&server, dir.path());
        let revision = widget().version("1.0.0-SNAPSHOT");

        let mut tx = cache.release(&revision, ReleaseOptions::default()).unwrap();
        let built = chrono::DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        tx.set_build(built, 7).unwrap();
        tx.add(&revision.archive("jar", None), &mut &JAR[..]).unwrap();
        assert_eq!(tx.close().await.unwrap(), ReleaseOutcome::Committed);

        let requests = server.received_requests().await.unwrap();
        let jar = "/com/acme/widget/1.0.0-SNAPSHOT/widget-1.0.0-20240101.120000-7.jar";
        assert!(
            requests
                .iter()
                .any(|r| r.method.as_str() == "PUT" && r.url.path() == jar)
        );

        let resolved = cache.resolved_archive(&revision, "jar", None).await.unwrap();
        assert_eq!(resolved.file_version().as_str(), "1.0.0-20240101.120000-7");
    }
}

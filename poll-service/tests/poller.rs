use async_trait::async_trait;
use comment_store::JsonFileStore;
use commentwatch_core::{
    CoreError, Credentials, ErrorClass, InstagramApiError, MediaMetadata, SettingsLoader,
};
use instagram_client::{
    DeviceIds, InstagramApi, PageRequest, SessionBlob, SessionManager, SessionStore, StopReason,
};
use poll_service::{CycleStatus, PollerConfig, PostResult, SettingsPoller};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

const POST_URL: &str = "https://www.instagram.com/p/B-fKL9qpeab/";

/// Serves `comment_count` comments in pages keyed off the cursor and records
/// when it was asked for what.
struct FakeInstagram {
    origin: Instant,
    comment_count: u64,
    reject_password: bool,
    expire_pages: Mutex<usize>,
    logins: Mutex<Vec<Duration>>,
    probes: Mutex<usize>,
    metadata_calls: Mutex<Vec<Duration>>,
    page_calls: Mutex<usize>,
}

impl FakeInstagram {
    fn new(comment_count: u64) -> Self {
        Self {
            origin: Instant::now(),
            comment_count,
            reject_password: false,
            expire_pages: Mutex::new(0),
            logins: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
            metadata_calls: Mutex::new(Vec::new()),
            page_calls: Mutex::new(0),
        }
    }

    fn logins(&self) -> Vec<Duration> {
        self.logins.lock().unwrap().clone()
    }

    fn metadata_calls(&self) -> Vec<Duration> {
        self.metadata_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstagramApi for FakeInstagram {
    async fn login(&mut self, _credentials: &Credentials) -> Result<(), CoreError> {
        self.logins.lock().unwrap().push(self.origin.elapsed());
        if self.reject_password {
            return Err(InstagramApiError::AuthenticationFailed {
                reason: "incorrect password".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn resume_session(&mut self, _session: SessionBlob) -> Result<(), CoreError> {
        Ok(())
    }

    fn export_session(&self) -> Result<SessionBlob, CoreError> {
        Ok(SessionBlob {
            username: Some("watcher".to_string()),
            cookies: BTreeMap::from([("sessionid".to_string(), "abc".to_string())]),
            device: DeviceIds::generate(),
            user_agent: "fake".to_string(),
            last_login: None,
        })
    }

    async fn probe(&self) -> Result<(), CoreError> {
        *self.probes.lock().unwrap() += 1;
        Ok(())
    }

    fn resolve_post_id(&self, post_reference: &str) -> Result<String, CoreError> {
        if post_reference.contains("bad") {
            return Err(InstagramApiError::InvalidPostUrl {
                url: post_reference.to_string(),
            }
            .into());
        }
        Ok("2278584739065882267".to_string())
    }

    async fn media_metadata(&self, _media_id: &str) -> Result<MediaMetadata, CoreError> {
        self.metadata_calls.lock().unwrap().push(self.origin.elapsed());
        Ok(MediaMetadata {
            comment_count: self.comment_count,
            code: "B-fKL9qpeab".to_string(),
        })
    }

    async fn comments_page(&self, request: PageRequest<'_>) -> Result<Vec<Value>, CoreError> {
        *self.page_calls.lock().unwrap() += 1;
        {
            let mut expire = self.expire_pages.lock().unwrap();
            if *expire > 0 {
                *expire -= 1;
                return Err(InstagramApiError::LoginRequired.into());
            }
        }
        let start = request
            .cursor
            .and_then(|c| c.parse::<u64>().ok())
            .map_or(0, |c| c + 1);
        let end = (start + request.page_size as u64).min(self.comment_count);
        Ok((start..end).map(|pk| json!({ "pk": pk, "text": "nice" })).collect())
    }
}

fn write_settings(path: &Path, posts: &[&str], check_interval: u64, output_dir: &Path) {
    let settings = json!({
        "instagram_username": "watcher",
        "instagram_password": "s3cret",
        "posts": posts,
        "check_interval": check_interval,
        "output_dir": output_dir,
    });
    std::fs::write(path, serde_json::to_vec_pretty(&settings).unwrap()).unwrap();
}

fn poller(dir: &TempDir, api: FakeInstagram) -> SettingsPoller<FakeInstagram> {
    let session = SessionManager::new(api, SessionStore::new(dir.path().join("cookies.json")));
    let config = PollerConfig {
        output_dir: dir.path().to_path_buf(),
        ..PollerConfig::default()
    };
    SettingsPoller::new(session, SettingsLoader::new(settings_path(dir)), config)
}

fn settings_path(dir: &TempDir) -> PathBuf {
    dir.path().join("settings.json")
}

#[tokio::test(start_paused = true)]
async fn test_cycles_are_spaced_by_processing_then_interval() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    write_settings(&settings_path(&dir), &[POST_URL], 5, &out);

    let mut poller = poller(&dir, FakeInstagram::new(25));
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        let result = poller.run(token).await;
        (poller, result)
    });

    sleep(Duration::from_secs(26)).await;
    shutdown.cancel();
    let (poller, result) = handle.await.unwrap();
    result.unwrap();

    let api = poller.session().client();
    assert_eq!(api.logins(), vec![Duration::ZERO]);
    // 5s page pause + 10s post pause + 5s interval
    assert_eq!(
        api.metadata_calls(),
        vec![Duration::ZERO, Duration::from_secs(20)]
    );
    assert_eq!(*api.page_calls.lock().unwrap(), 4);

    let saved = JsonFileStore::new(&out)
        .read("2278584739065882267")
        .await
        .unwrap();
    assert_eq!(saved.len(), 25);
    assert!(dir.path().join("cookies.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_missing_settings_stalls_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut poller = poller(&dir, FakeInstagram::new(0));
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        let result = poller.run(token).await;
        (poller, result)
    });

    sleep(Duration::from_secs(15)).await;
    write_settings(&settings_path(&dir), &[], 60, dir.path());
    sleep(Duration::from_secs(10)).await;
    shutdown.cancel();

    let (poller, result) = handle.await.unwrap();
    result.unwrap();
    // attempts at 0s and 10s find no settings; the one at 20s logs in
    assert_eq!(poller.session().client().logins(), vec![Duration::from_secs(20)]);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_end_startup() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(&settings_path(&dir), &[POST_URL], 60, dir.path());
    let mut api = FakeInstagram::new(0);
    api.reject_password = true;
    let mut poller = poller(&dir, api);

    let err = poller.run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Authentication);
    assert!(!poller.session().is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_bad_post_does_not_stop_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(&settings_path(&dir), &["not-a-bad-link", POST_URL], 60, dir.path());
    let mut poller = poller(&dir, FakeInstagram::new(25));
    poller.start().await.unwrap();
    let start = Instant::now();

    let report = poller.run_cycle().await;

    assert_eq!(report.status, CycleStatus::Completed);
    assert_eq!(report.posts.len(), 2);
    assert!(matches!(
        report.posts[0].result,
        PostResult::Failed {
            class: ErrorClass::FatalClient,
            ..
        }
    ));
    assert_eq!(report.posts[0].resource_id, None);
    match &report.posts[1].result {
        PostResult::Fetched(outcome) => {
            assert_eq!(outcome.stop, StopReason::TargetReached);
            assert_eq!(outcome.record_ids.len(), 25);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(report.failed_posts(), 1);
    assert_eq!(report.comments_saved(), 25);
    assert_eq!(report.next_cycle_in, Duration::from_secs(60));
    assert_eq!(start.elapsed(), Duration::from_secs(10 + 5 + 10));
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_is_revalidated_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(&settings_path(&dir), &[POST_URL, POST_URL], 60, dir.path());
    let api = FakeInstagram::new(10);
    *api.expire_pages.lock().unwrap() = 1;
    let mut poller = poller(&dir, api);
    poller.start().await.unwrap();

    let first = poller.run_cycle().await;
    assert_eq!(first.status, CycleStatus::SessionExpired);
    assert_eq!(first.posts.len(), 1);
    assert!(!poller.session().is_authenticated());

    let second = poller.run_cycle().await;
    assert_eq!(second.status, CycleStatus::Completed);
    assert_eq!(second.posts.len(), 2);
    assert_eq!(second.comments_saved(), 20);

    let api = poller.session().client();
    // the cached session from the first login is accepted again
    assert_eq!(api.logins().len(), 1);
    assert_eq!(*api.probes.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_settings_mid_run_stall_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(&settings_path(&dir), &[POST_URL], 60, dir.path());
    let mut poller = poller(&dir, FakeInstagram::new(0));
    poller.start().await.unwrap();

    std::fs::write(settings_path(&dir), b"{ \"posts\": [").unwrap();
    let report = poller.run_cycle().await;

    assert!(matches!(report.status, CycleStatus::SettingsUnavailable { .. }));
    assert!(report.posts.is_empty());
    assert_eq!(report.next_cycle_in, Duration::from_secs(10));
    assert!(poller.session().client().metadata_calls().is_empty());
}

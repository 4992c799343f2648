//! Integration tests for the check-then-apply flow.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use namu_updater::{
    ApplyState, DecisionReason, FileAttemptSink, InstallError, MemoryVersionStore,
    PackageInstaller, Platform, UpdateEvent, Updater, UpdaterConfig, Version, VersionStore,
    WebReloader,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PACKAGE: &[u8] = b"namustock 1.0.78 package bytes";

/// Installer that records the packages it was given.
#[derive(Default)]
struct RecordingInstaller {
    installed: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

#[async_trait]
impl PackageInstaller for RecordingInstaller {
    async fn install(&self, package: &Path) -> Result<(), InstallError> {
        let bytes = std::fs::read(package)?;
        self.installed
            .lock()
            .unwrap()
            .push((package.to_path_buf(), bytes));
        Ok(())
    }
}

/// Reloader that records the order of calls.
#[derive(Default)]
struct RecordingReloader {
    calls: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl WebReloader for RecordingReloader {
    async fn invalidate_cache(&self) -> Result<(), InstallError> {
        self.calls.lock().unwrap().push("invalidate");
        Ok(())
    }

    async fn reload(&self) -> Result<(), InstallError> {
        self.calls.lock().unwrap().push("reload");
        Ok(())
    }
}

fn config(server: &MockServer, download_dir: &Path) -> UpdaterConfig {
    let mut config = UpdaterConfig::default();
    // The registry is down; the manifest carries the checksum.
    config.repository.api_base_url = server.uri();
    config.manifest.url = Some(format!("{}/version.json", server.uri()));
    config.network.max_retries = 0;
    config.platform.current = Some(Platform::Android);
    config.versions.build_version = "1.0.77".to_string();
    config.storage.download_dir = Some(download_dir.to_path_buf());
    config
}

async fn mount_backends(server: &MockServer, checksum: &str) {
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0.78",
            "features": ["Barcode scanning", "Offline sales"],
            "downloads": { "android": format!("{}/namustock-release.apk", server.uri()) },
            "checksums": { "android": checksum }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/namustock-release.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PACKAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_check_then_apply_native_update() {
    let server = MockServer::start().await;
    mount_backends(&server, &hex::encode(Sha256::digest(PACKAGE))).await;

    let temp_dir = TempDir::new().unwrap();
    let installer = Arc::new(RecordingInstaller::default());
    let store = Arc::new(MemoryVersionStore::new());
    let updater = Updater::builder(config(&server, temp_dir.path()))
        .installer(installer.clone())
        .version_store(store.clone())
        .build()
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = updater.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    let decision = updater.check_manually().await;
    assert!(decision.available);
    let candidate = decision.candidate.unwrap();
    assert_eq!(
        candidate.release_notes(),
        "- Barcode scanning\n- Offline sales"
    );

    let states: Vec<ApplyState> = updater.apply(candidate).collect().await;
    assert_eq!(states.first(), Some(&ApplyState::Downloading(0)));
    assert_eq!(states.last(), Some(&ApplyState::Completed));
    assert!(states.contains(&ApplyState::Installing));

    let installed = installer.installed.lock().unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].1, PACKAGE);
    assert!(installed[0].0.starts_with(temp_dir.path()));
    drop(installed);

    assert_eq!(store.load().unwrap(), Some(Version::parse("1.0.78")));
    assert_eq!(updater.current_version(), Version::parse("1.0.78"));

    let events = events.lock().unwrap().clone();
    assert!(matches!(events.first(), Some(UpdateEvent::UpdateAvailable { .. })));
    assert_eq!(
        events.last(),
        Some(&UpdateEvent::ApplyStateChanged(ApplyState::Completed))
    );
    assert!(updater.unsubscribe(subscription));
}

#[tokio::test]
async fn test_checksum_mismatch_stops_before_install() {
    let server = MockServer::start().await;
    mount_backends(&server, &hex::encode(Sha256::digest(b"something else"))).await;

    let temp_dir = TempDir::new().unwrap();
    let installer = Arc::new(RecordingInstaller::default());
    let updater = Updater::builder(config(&server, temp_dir.path()))
        .installer(installer.clone())
        .build()
        .unwrap();

    let candidate = updater.check_manually().await.candidate.unwrap();
    let states: Vec<ApplyState> = updater.apply(candidate).collect().await;

    assert!(matches!(states.last(), Some(ApplyState::Error(_))));
    assert!(!states.contains(&ApplyState::Installing));
    assert!(installer.installed.lock().unwrap().is_empty());
    assert_eq!(updater.current_version(), Version::parse("1.0.77"));
    assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_already_latest_after_apply_and_restart() {
    let server = MockServer::start().await;
    mount_backends(&server, &hex::encode(Sha256::digest(PACKAGE))).await;

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryVersionStore::new());
    {
        let updater = Updater::builder(config(&server, temp_dir.path()))
            .installer(Arc::new(RecordingInstaller::default()))
            .version_store(store.clone())
            .build()
            .unwrap();
        let candidate = updater.check_manually().await.candidate.unwrap();
        let _states: Vec<ApplyState> = updater.apply(candidate).collect().await;
    }

    // A fresh process with the same store sees the applied version.
    let updater = Updater::builder(config(&server, temp_dir.path()))
        .version_store(store)
        .build()
        .unwrap();
    let decision = updater.check_manually().await;
    assert_eq!(decision.reason, DecisionReason::AlreadyLatest);
}

#[tokio::test]
async fn test_web_update_reloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0.78",
            "baseUrl": "https://app.namustock.example"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = config(&server, temp_dir.path());
    config.platform.current = Some(Platform::Web);
    config.platform.supported = vec![Platform::Web];

    let reloader = Arc::new(RecordingReloader::default());
    let updater = Updater::builder(config)
        .web_reloader(reloader.clone())
        .build()
        .unwrap();

    let decision = updater.check_manually().await;
    let candidate = decision.candidate.unwrap();
    assert_eq!(
        candidate.download_url(),
        Some("https://app.namustock.example")
    );

    let states: Vec<ApplyState> = updater.apply(candidate).collect().await;
    assert_eq!(states.last(), Some(&ApplyState::Completed));
    assert_eq!(*reloader.calls.lock().unwrap(), vec!["invalidate", "reload"]);
}

#[tokio::test]
async fn test_attempts_are_logged_to_configured_file() {
    let server = MockServer::start().await;
    mount_backends(&server, &hex::encode(Sha256::digest(b"something else"))).await;

    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("state").join("attempts.jsonl");
    let mut config = config(&server, &temp_dir.path().join("downloads"));
    config.storage.attempt_log = Some(log_path.clone());

    let updater = Updater::builder(config)
        .installer(Arc::new(RecordingInstaller::default()))
        .build()
        .unwrap();

    // Checksum mismatch, then a retry that fails the same way.
    let candidate = updater.check_manually().await.candidate.unwrap();
    let _: Vec<ApplyState> = updater.apply(candidate.clone()).collect().await;
    let _: Vec<ApplyState> = updater.apply(candidate).collect().await;

    let attempts = FileAttemptSink::new(&log_path).load().await.unwrap();
    assert_eq!(attempts.len(), 2);
    for attempt in &attempts {
        assert!(!attempt.success);
        assert_eq!(attempt.from_version, Version::parse("1.0.77"));
        assert_eq!(attempt.to_version, Version::parse("1.0.78"));
        assert_eq!(attempt.platform, Platform::Android);
        assert!(attempt.error.as_deref().unwrap().contains("checksum"));
    }
}

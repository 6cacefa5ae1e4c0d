//! End-to-end integration tests for tool provisioning
//!
//! These tests acquire tools through every strategy against local stand-ins:
//! 1. PATH lookups of binaries every unix machine has (`sh`)
//! 2. Downloads from a throwaway HTTP server on 127.0.0.1
//! 3. Container extraction through an in-memory container runtime
//! 4. Builds from a git repository created on the fly
//!
//! Then they drive the resulting tool handles and the scenario runner.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio_util::sync::CancellationToken;

use sigstore_e2e::common::config::{Config, RegistryAuth, Timeouts};
use sigstore_e2e::common::logging;
use sigstore_e2e::setup::catalog::{ConsoleCatalog, StaticCatalog};
use sigstore_e2e::setup::docker::{ArchiveReader, ContainerRuntime};
use sigstore_e2e::setup::registry::tool_from_config;
use sigstore_e2e::testing::run_scenario;
use sigstore_e2e::{
    BuildFromGit, DownloadFromCatalog, Error, ErrorKind, ExtractFromContainer, LocalBinary,
    StrategyKind, Tool,
};

const SCRIPT: &[u8] = b"#!/bin/sh\necho cosign v2.4.1\n";

// === Local HTTP server ===

/// Canned response for one path
#[derive(Clone)]
enum Route {
    Ok(Vec<u8>),
    Status(u16),
    /// Accept the request and never answer
    Hang,
}

/// Minimal HTTP/1.1 server answering from a route table
struct TestServer {
    base: String,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();

        let (r, q) = (Arc::clone(&routes), Arc::clone(&requests));
        std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let (r, q) = (Arc::clone(&r), Arc::clone(&q));
                std::thread::spawn(move || serve_one(stream, &r, &q));
            }
        });

        Self {
            base,
            routes,
            requests,
        }
    }

    fn route(&self, path: &str, route: Route) -> String {
        self.routes.lock().unwrap().insert(path.to_string(), route);
        format!("{}{}", self.base, path)
    }

    fn request_heads(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve_one(
    mut stream: TcpStream,
    routes: &Mutex<HashMap<String, Route>>,
    requests: &Mutex<Vec<String>>,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head).to_string();
    let path = head
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    requests.lock().unwrap().push(head);

    let route = routes.lock().unwrap().get(&path).cloned();
    let (status, body) = match route {
        Some(Route::Ok(body)) => (200, body),
        Some(Route::Status(code)) => (code, Vec::new()),
        Some(Route::Hang) => {
            std::thread::sleep(Duration::from_secs(30));
            return;
        }
        None => (404, Vec::new()),
    };

    let header = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
}

// === Payload helpers ===

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn zip_single(name: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn tar_single(name: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, name, data).unwrap();
    builder.into_inner().unwrap()
}

/// Deterministic bytes that gzip cannot shrink much
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

// === In-memory container runtime ===

#[derive(Default)]
struct FakeRuntime {
    archive: Vec<u8>,
    fail_pull: bool,
    /// Copy never completes
    stall_copy: bool,
    pulled: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl FakeRuntime {
    fn with_archive(archive: Vec<u8>) -> Self {
        Self {
            archive,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, image: &str, _auth: &RegistryAuth) -> sigstore_e2e::Result<()> {
        if self.fail_pull {
            return Err(Error::Docker(format!("pull access denied for {}", image)));
        }
        self.pulled.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn create_container(
        &self,
        _image: &str,
        name: &str,
        _platform: &str,
    ) -> sigstore_e2e::Result<String> {
        let id = format!("ctr-{}", name);
        self.created.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn copy_from_container(
        &self,
        _id: &str,
        _path: &str,
        _cancel: &CancellationToken,
    ) -> sigstore_e2e::Result<ArchiveReader> {
        if self.stall_copy {
            std::future::pending::<()>().await;
        }
        Ok(Box::new(std::io::Cursor::new(self.archive.clone())))
    }

    async fn remove_container(&self, id: &str) -> sigstore_e2e::Result<()> {
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=e2e", "-c", "user.email=e2e@example.com"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("run git");
    assert!(status.success(), "git {:?} failed", args);
}

/// Repository with a `tool.sh` script committed on `main`
fn make_repo(root: &Path) -> PathBuf {
    let repo = root.join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "--quiet"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(repo.join("tool.sh"), SCRIPT).unwrap();
    git(&repo, &["add", "tool.sh"]);
    git(&repo, &["commit", "--quiet", "-m", "add tool"]);
    repo
}

// === Local lookup ===

#[cfg(unix)]
#[tokio::test]
async fn test_local_tool_runs() {
    logging::init_test();
    let cancel = CancellationToken::new();
    let mut tool = Tool::new("sh").with_setup_strategy(LocalBinary::new());

    let path = tool.setup(&cancel).await.unwrap().to_path_buf();
    assert!(path.is_absolute());
    assert_eq!(tool.strategy_kind(), Some(StrategyKind::Local));

    let out = tool
        .command_output(&cancel, ["-c", "printf 'tlog entry %s' 42"])
        .await
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "tlog entry 42");

    tool.destroy().unwrap();
    assert!(path.exists(), "destroy must not touch binaries it did not create");
}

#[tokio::test]
async fn test_missing_local_tool() {
    let cancel = CancellationToken::new();
    let mut tool =
        Tool::new("sigstore-e2e-no-such-tool").with_setup_strategy(LocalBinary::new());
    let err = tool.setup(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::NotFoundOnPath { .. }), "got {:?}", err);
    assert_eq!(err.kind(), ErrorKind::Acquisition);
}

// === Catalog download ===

#[tokio::test]
async fn test_download_gzip_payload() {
    logging::init_test();
    let server = TestServer::start();
    let url = server.route("/cosign-linux-amd64.gz", Route::Ok(gzip(SCRIPT)));
    let catalog = StaticCatalog::default().with_link("cosign", "linux", &url);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(
        DownloadFromCatalog::new("cosign", Arc::new(catalog)).for_os("linux"),
    );
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();

    assert_eq!(path.file_name().unwrap(), "cosign");
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);
    assert!(is_executable(&path));

    tool.destroy().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_download_zip_and_raw_payloads() {
    let server = TestServer::start();
    let zip_url = server.route("/oc.zip", Route::Ok(zip_single("oc", SCRIPT)));
    let raw_url = server.route("/kubectl", Route::Ok(SCRIPT.to_vec()));
    let catalog = Arc::new(
        StaticCatalog::default()
            .with_link("oc", "linux", &zip_url)
            .with_link("kubectl", "linux", &raw_url),
    );

    let cancel = CancellationToken::new();
    for name in ["oc", "kubectl"] {
        let mut tool = Tool::new(name).with_setup_strategy(
            DownloadFromCatalog::new(name, catalog.clone()).for_os("linux"),
        );
        let path = tool.setup(&cancel).await.unwrap().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), SCRIPT, "{}", name);
        assert!(is_executable(&path));
        tool.destroy().unwrap();
    }
}

#[tokio::test]
async fn test_download_tar_gz_payload() {
    let server = TestServer::start();
    let url = server.route(
        "/oc.tar.gz",
        Route::Ok(gzip(&tar_single("oc", SCRIPT))),
    );
    let catalog = StaticCatalog::default().with_link("oc", "linux", &url);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("oc").with_setup_strategy(
        DownloadFromCatalog::new("oc", Arc::new(catalog)).for_os("linux"),
    );
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);
    assert!(is_executable(&path));
    tool.destroy().unwrap();
}

#[tokio::test]
async fn test_download_http_error() {
    let server = TestServer::start();
    let url = server.route("/cosign.gz", Route::Status(404));
    let catalog = StaticCatalog::default().with_link("cosign", "linux", &url);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(
        DownloadFromCatalog::new("cosign", Arc::new(catalog)).for_os("linux"),
    );
    let err = tool.setup(&cancel).await.unwrap_err();
    match &err {
        Error::Download { url: failed, message } => {
            assert_eq!(failed, &url);
            assert!(message.contains("404"), "{}", message);
        }
        other => panic!("expected Download error, got {:?}", other),
    }
    assert!(!tool.is_ready());
}

#[tokio::test]
async fn test_download_cancelled_mid_request() {
    let server = TestServer::start();
    let url = server.route("/slow.gz", Route::Hang);
    let catalog = StaticCatalog::default().with_link("slow", "linux", &url);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("slow").with_setup_strategy(
        DownloadFromCatalog::new("slow", Arc::new(catalog)).for_os("linux"),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = tool.setup(&cancel).await.unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);
    assert_eq!(err.kind(), ErrorKind::Cancellation);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_console_catalog_resolves_link() {
    let server = TestServer::start();
    let binary_url = server.route("/artifacts/linux/cosign.gz", Route::Ok(gzip(SCRIPT)));
    let resource = serde_json::json!({
        "apiVersion": "console.openshift.io/v1",
        "kind": "ConsoleCLIDownload",
        "metadata": { "name": "cosign" },
        "spec": {
            "displayName": "cosign",
            "links": [
                { "href": format!("{}/artifacts/windows/cosign.exe.gz", server.base), "text": "Download cosign for Windows" },
                { "href": binary_url, "text": "Download cosign for Linux" }
            ]
        }
    });
    server.route(
        "/apis/console.openshift.io/v1/consoleclidownloads/cosign",
        Route::Ok(serde_json::to_vec(&resource).unwrap()),
    );

    let catalog =
        ConsoleCatalog::new(&server.base, Some("sha256~token".into()), &Timeouts::default())
            .unwrap();
    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(
        DownloadFromCatalog::new("cosign", Arc::new(catalog)).for_os("linux"),
    );
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);

    let heads = server.request_heads();
    let lookup = heads
        .iter()
        .find(|h| h.contains("consoleclidownloads"))
        .expect("catalog request");
    assert!(
        lookup.to_lowercase().contains("authorization: bearer sha256~token"),
        "{}",
        lookup
    );
    tool.destroy().unwrap();
}

#[tokio::test]
async fn test_console_catalog_missing_resource() {
    let server = TestServer::start();
    let catalog = ConsoleCatalog::new(&server.base, None, &Timeouts::default()).unwrap();
    let cancel = CancellationToken::new();
    let mut tool = Tool::new("rekor-cli").with_setup_strategy(
        DownloadFromCatalog::new("rekor-cli", Arc::new(catalog)).for_os("linux"),
    );
    let err = tool.setup(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::CatalogLookup { .. }), "got {:?}", err);
}

// === Container extraction ===

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_container_extraction_gunzips_payload() {
    logging::init_test();
    let runtime = Arc::new(FakeRuntime::with_archive(tar_single(
        "rekor-cli.gz",
        &gzip(SCRIPT),
    )));
    let strategy = ExtractFromContainer::with_runtime(
        "ghcr.io/sigstore/rekor-cli:latest",
        "/usr/local/bin/rekor-cli.gz",
        runtime.clone(),
    );

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("rekor-cli").with_setup_strategy(strategy);
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();

    assert_eq!(path.file_name().unwrap(), "rekor-cli");
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);
    assert!(is_executable(&path));

    assert_eq!(
        *runtime.pulled.lock().unwrap(),
        vec!["ghcr.io/sigstore/rekor-cli:latest".to_string()]
    );
    assert_eq!(*runtime.removed.lock().unwrap(), *runtime.created.lock().unwrap());

    tool.destroy().unwrap();
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_container_extraction_plain_binary() {
    let runtime = Arc::new(FakeRuntime::with_archive(tar_single("cosign", SCRIPT)));
    let strategy =
        ExtractFromContainer::with_runtime("cgr.dev/chainguard/cosign", "/usr/bin/cosign", runtime);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(strategy);
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);
    tool.destroy().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_container_keep_container() {
    let runtime = Arc::new(FakeRuntime::with_archive(tar_single("cosign", SCRIPT)));
    let strategy =
        ExtractFromContainer::with_runtime("cgr.dev/chainguard/cosign", "/usr/bin/cosign", runtime.clone())
            .keep_container();

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(strategy);
    tool.setup(&cancel).await.unwrap();
    assert_eq!(runtime.created.lock().unwrap().len(), 1);
    assert!(runtime.removed.lock().unwrap().is_empty());
    tool.destroy().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_container_truncated_archive() {
    let mut archive = tar_single("rekor-cli.gz", &gzip(&noise(64 * 1024)));
    archive.truncate(4096);
    let runtime = Arc::new(FakeRuntime::with_archive(archive));
    let strategy = ExtractFromContainer::with_runtime(
        "ghcr.io/sigstore/rekor-cli",
        "/usr/local/bin/rekor-cli.gz",
        runtime.clone(),
    );

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("rekor-cli").with_setup_strategy(strategy);
    let err = tool.setup(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decompression, "got {:?}", err);
    assert!(!tool.is_ready());
    assert_eq!(runtime.removed.lock().unwrap().len(), 1, "container removed after failure");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_container_removed_when_setup_cancelled() {
    let runtime = Arc::new(FakeRuntime {
        stall_copy: true,
        ..Default::default()
    });
    let strategy =
        ExtractFromContainer::with_runtime("cgr.dev/chainguard/cosign", "/usr/bin/cosign", runtime.clone());

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let mut tool = Tool::new("cosign").with_setup_strategy(strategy);
    let started = Instant::now();
    let err = tool.setup(&cancel).await.unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!tool.is_ready());

    // Removal runs on a background task once the acquisition is dropped
    let deadline = Instant::now() + Duration::from_secs(5);
    while runtime.removed.lock().unwrap().is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(runtime.created.lock().unwrap().len(), 1);
    assert_eq!(*runtime.removed.lock().unwrap(), *runtime.created.lock().unwrap());
}

#[tokio::test]
async fn test_container_pull_failure() {
    let runtime = Arc::new(FakeRuntime {
        fail_pull: true,
        ..Default::default()
    });
    let strategy =
        ExtractFromContainer::with_runtime("private.example/cosign", "/usr/bin/cosign", runtime.clone());

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("cosign").with_setup_strategy(strategy);
    let err = tool.setup(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Docker(ref m) if m.contains("pull access denied")));
    assert!(runtime.created.lock().unwrap().is_empty());
}

// === Build from git ===

#[tokio::test]
async fn test_build_from_local_repository() {
    if !git_available() {
        eprintln!("Skipping test: git not found");
        return;
    }
    logging::init_test();
    let root = tempfile::tempdir().unwrap();
    let repo = make_repo(root.path());

    let strategy = BuildFromGit::new(format!("file://{}", repo.display()), "main")
        .with_build_command(vec![
            "sh".into(),
            "-c".into(),
            "cp tool.sh {name} && chmod +x {name}".into(),
        ]);

    let cancel = CancellationToken::new();
    let mut tool = Tool::new("gitsign").with_setup_strategy(strategy);
    let path = tool.setup(&cancel).await.unwrap().to_path_buf();
    assert_eq!(path.file_name().unwrap(), "gitsign");
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);

    tool.destroy().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_build_unknown_branch() {
    if !git_available() {
        eprintln!("Skipping test: git not found");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let repo = make_repo(root.path());

    let strategy = BuildFromGit::new(format!("file://{}", repo.display()), "release-9.9");
    let cancel = CancellationToken::new();
    let mut tool = Tool::new("gitsign").with_setup_strategy(strategy);
    let err = tool.setup(&cancel).await.unwrap_err();
    match err {
        Error::GitClone { branch, .. } => assert_eq!(branch, "release-9.9"),
        other => panic!("expected GitClone, got {:?}", other),
    }
}

#[tokio::test]
async fn test_build_failure_reports_tool() {
    if !git_available() {
        eprintln!("Skipping test: git not found");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let repo = make_repo(root.path());

    let strategy = BuildFromGit::new(format!("file://{}", repo.display()), "main")
        .with_build_command(vec!["sh".into(), "-c".into(), "echo 'undefined: main' >&2; exit 2".into()]);
    let cancel = CancellationToken::new();
    let mut tool = Tool::new("gitsign").with_setup_strategy(strategy);
    let err = tool.setup(&cancel).await.unwrap_err();
    match err {
        Error::Build { tool, message } => {
            assert_eq!(tool, "gitsign");
            assert!(message.contains("undefined: main"), "{}", message);
        }
        other => panic!("expected Build error, got {:?}", other),
    }
}

// === Configuration and scenarios ===

#[cfg(unix)]
#[tokio::test]
async fn test_tool_from_config_file() {
    let config = Config::from_toml(
        r#"
[tools.sh]
strategy = "local"

[tools.cosign]
strategy = "extract_from_container"
image = "ghcr.io/sigstore/cosign/cosign:v2.4.1"
path = "/ko-app/cosign"
"#,
    )
    .unwrap();

    let cosign = tool_from_config("cosign", &config).unwrap();
    assert_eq!(cosign.strategy_kind(), Some(StrategyKind::ExtractFromContainer));

    let cancel = CancellationToken::new();
    let mut sh = tool_from_config("sh", &config).unwrap();
    sh.setup(&cancel).await.unwrap();
    let out = sh.command_output(&cancel, ["-c", "echo ok"]).await.unwrap();
    assert_eq!(out, b"ok\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_scenario_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    std::fs::write(
        &path,
        r#"
name: local shell round trip
tools:
  sh:
    strategy: local
env:
  DIGEST: sha256:abc123
setup:
  - shell: echo payload > blob.txt
steps:
  - action: run
    tool: sh
    args: ["-c", "cat blob.txt; echo signed ${DIGEST}"]
    expect:
      output_contains: "signed sha256:abc123"
  - action: run
    tool: sh
    args: ["-c", "test -f \"$WORKDIR/blob.txt\""]
  - action: run
    tool: sh
    args: ["-c", "echo 'no signatures found' >&2; exit 1"]
    expect:
      success: false
      stderr_contains: no signatures found
"#,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let result = run_scenario(&path, &Config::default(), &cancel, false)
        .await
        .unwrap();
    assert!(result.passed, "{:?}", result.error);
    assert_eq!(result.steps_run, 3);
    assert_eq!(result.steps_total, 3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_scenario_reports_failed_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    std::fs::write(
        &path,
        r#"
name: failing verification
steps:
  - action: run
    tool: sh
    args: ["-c", "echo verified"]
  - action: run
    tool: sh
    args: ["-c", "echo 'invalid signature' >&2; exit 1"]
  - action: run
    tool: sh
    args: ["-c", "echo unreachable"]
"#,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let result = run_scenario(&path, &Config::default(), &cancel, false)
        .await
        .unwrap();
    assert!(!result.passed);
    assert_eq!(result.steps_run, 2);
    let error = result.error.unwrap();
    assert!(error.contains("invalid signature"), "{}", error);
}

#[tokio::test]
async fn test_scenario_with_unavailable_tool() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    std::fs::write(
        &path,
        "name: missing\nsteps:\n  - action: run\n    tool: sigstore-e2e-no-such-tool\n",
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let result = run_scenario(&path, &Config::default(), &cancel, false)
        .await
        .unwrap();
    assert!(!result.passed);
    assert_eq!(result.steps_run, 0);
    assert!(result.error.unwrap().contains("not found on PATH"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_scenario_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    std::fs::write(
        &path,
        "name: slow\nsteps:\n  - action: run\n    tool: sh\n    args: [\"-c\", \"sleep 30\"]\n",
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = run_scenario(&path, &Config::default(), &cancel, false)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[tokio::test]
async fn test_bundled_scenario_parses_and_runs() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scenarios")
        .join("local_shell.yaml");
    let cancel = CancellationToken::new();
    let result = run_scenario(&path, &Config::default(), &cancel, false)
        .await
        .unwrap();
    assert!(result.passed, "{:?}", result.error);
}

//! Shared acquisition utilities
//!
//! Workspaces, streaming downloads, archive sniffing and subprocess helpers
//! used by the individual strategies.

use crate::common::config::WorkspaceConfig;
use crate::common::paths::workspace_root;
use crate::common::{cancellable, Error, Result};
use crate::setup::archive::{untar_to_file, PIPE_CAPACITY};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;

/// Ephemeral directory holding one acquisition's artifacts
///
/// Removed on [`Workspace::close`] or drop, unless it was created with
/// `keep = true`, in which case it stays on disk for inspection.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a private temp directory prefixed with `name`
    pub fn create(name: &str, settings: &WorkspaceConfig) -> Result<Self> {
        let prefix = format!("{}-", sanitize_prefix(name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &settings.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir_in(workspace_root())?,
        };

        if settings.keep {
            let path = dir.keep();
            tracing::debug!(workspace = %path.display(), "Keeping workspace");
            return Ok(Self { dir: None, path });
        }

        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory outlives this value
    pub fn is_kept(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the directory now, reporting failures
    pub fn close(self) -> Result<()> {
        match self.dir {
            Some(dir) => {
                tracing::debug!(workspace = %self.path.display(), "Removing workspace");
                dir.close()?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn sanitize_prefix(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "tool".to_string()
    } else {
        cleaned
    }
}

/// Payload formats recognized when unpacking a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Gzip,
    TarGzip,
    Tar,
    Zip,
    Raw,
}

/// Bytes inspected before choosing how to unpack
const SNIFF_LEN: usize = 512;

impl PayloadFormat {
    /// Detect the format from the first bytes of a payload
    ///
    /// Gzip payloads report `Gzip` here; whether they wrap a tar archive is
    /// only known once decompressed.
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            PayloadFormat::Gzip
        } else if head.starts_with(b"PK\x03\x04") {
            PayloadFormat::Zip
        } else if is_tar(head) {
            PayloadFormat::Tar
        } else {
            PayloadFormat::Raw
        }
    }
}

/// POSIX and GNU tar headers carry `ustar` at offset 257
fn is_tar(head: &[u8]) -> bool {
    head.get(257..262) == Some(b"ustar".as_slice())
}

/// Read up to [`SNIFF_LEN`] bytes, returning them and a reader that replays them
fn peek<R: Read>(mut reader: R) -> io::Result<(Vec<u8>, io::Chain<io::Cursor<Vec<u8>>, R>)> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok((head.clone(), io::Cursor::new(head).chain(reader)))
}

fn gunzip_error(e: io::Error) -> Error {
    Error::Decompression(format!("gunzip failed: {}", e))
}

/// Unpack a downloaded payload read from a blocking reader into `dest`
///
/// gzip (single or multi-member), tar, tar.gz and zip payloads yield their
/// first regular file; anything else is copied verbatim. Zip payloads are
/// spooled to `scratch` since the central directory sits at the end.
fn unpack_payload<R: Read>(reader: R, dest: &Path, scratch: &Path) -> Result<PayloadFormat> {
    let (head, mut reader) = peek(reader)?;
    if head.is_empty() {
        return Err(Error::Decompression("payload is empty".to_string()));
    }

    let format = match PayloadFormat::sniff(&head) {
        PayloadFormat::Gzip | PayloadFormat::TarGzip => {
            let decoder = flate2::read::MultiGzDecoder::new(reader);
            let (inner, mut decoded) = peek(decoder).map_err(gunzip_error)?;
            if is_tar(&inner) {
                untar_to_file(decoded, dest)?;
                PayloadFormat::TarGzip
            } else {
                let mut out = create_executable_file(dest)?;
                io::copy(&mut decoded, &mut out).map_err(gunzip_error)?;
                out.flush()?;
                PayloadFormat::Gzip
            }
        }
        PayloadFormat::Tar => {
            untar_to_file(reader, dest)?;
            PayloadFormat::Tar
        }
        PayloadFormat::Zip => {
            let spool = scratch.join("download.zip");
            let mut file = File::create(&spool)?;
            io::copy(&mut reader, &mut file)?;
            file.flush()?;
            drop(file);
            extract_first_zip_entry(&spool, dest)?;
            std::fs::remove_file(&spool)?;
            PayloadFormat::Zip
        }
        PayloadFormat::Raw => {
            let mut out = create_executable_file(dest)?;
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
            PayloadFormat::Raw
        }
    };
    Ok(format)
}

/// How feeding the unpack stage stopped early
enum FeedError {
    Download(Error),
    /// The unpack stage stopped reading
    PipeClosed,
}

/// Download `url` into `dest`, unpacking archives on the fly
///
/// The response body is streamed through a bounded pipe into a blocking
/// unpack stage, so decompression and file writes stay off the async
/// workers. `scratch` holds intermediate files. Returns the detected
/// payload format.
pub async fn download_and_unpack(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    scratch: &Path,
) -> Result<PayloadFormat> {
    let response = client
        .get(url)
        .header("User-Agent", crate::common::paths::APP_NAME)
        .send()
        .await
        .map_err(|e| Error::download(url, e))?;

    if !response.status().is_success() {
        return Err(Error::download(
            url,
            format!("server returned status {}", response.status()),
        ));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if total_size > 0 {
        let pb = ProgressBar::new(total_size);
        let style = ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    let (mut pipe_writer, pipe_reader) = tokio::io::duplex(PIPE_CAPACITY);
    let body = SyncIoBridge::new(pipe_reader);
    let (unpack_dest, unpack_scratch) = (dest.to_path_buf(), scratch.to_path_buf());
    let unpack =
        tokio::task::spawn_blocking(move || unpack_payload(body, &unpack_dest, &unpack_scratch));

    let mut stream = std::pin::pin!(response.bytes_stream());
    let mut downloaded: u64 = 0;
    let mut fed: std::result::Result<(), FeedError> = Ok(());

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                fed = Err(FeedError::Download(Error::download(url, e)));
                break;
            }
        };
        downloaded += chunk.len() as u64;
        if let Some(ref pb) = pb {
            pb.set_position(downloaded);
        }
        if pipe_writer.write_all(&chunk).await.is_err() {
            fed = Err(FeedError::PipeClosed);
            break;
        }
    }
    if fed.is_ok() && pipe_writer.shutdown().await.is_err() {
        fed = Err(FeedError::PipeClosed);
    }
    drop(pipe_writer);

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let unpacked = unpack
        .await
        .map_err(|e| Error::Internal(format!("unpack stage failed: {}", e)))?;

    // A tar unpack may stop reading once its entry is out; that is not a failure
    match fed {
        Err(FeedError::Download(e)) => return Err(e),
        Err(FeedError::PipeClosed) | Ok(()) => {}
    }
    if downloaded == 0 {
        return Err(Error::download(url, "empty response body"));
    }

    let format = unpacked?;
    tracing::debug!(url, bytes = downloaded, ?format, "Download complete");
    Ok(format)
}

/// Extract the first regular file of a zip archive to `dest`
pub fn extract_first_zip_entry(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Decompression(format!("Failed to open zip: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Decompression(format!("Failed to read zip entry: {}", e)))?;
        if entry.is_dir() {
            continue;
        }
        let mut out = create_executable_file(dest)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| Error::Decompression(format!("Failed to unzip {}: {}", entry.name(), e)))?;
        return Ok(());
    }

    Err(Error::Decompression("zip archive contains no files".to_string()))
}

/// Create (or truncate) a file with owner-execute permissions (0711)
#[cfg(unix)]
pub fn create_executable_file(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o711)
        .open(path)?;
    Ok(file)
}

#[cfg(not(unix))]
pub fn create_executable_file(path: &Path) -> Result<File> {
    Ok(File::create(path)?)
}

/// Make a file executable on Unix
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o711);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Run a command to completion, capturing output
///
/// The child is killed if `cancel` fires. A non-zero exit is not an error
/// here; callers decide how to report it.
pub async fn run_command(
    command: &mut tokio::process::Command,
    cancel: &CancellationToken,
    operation: &str,
) -> Result<Output> {
    let program = PathBuf::from(command.as_std().get_program());
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cancellable(cancel, operation, async {
        command.output().await.map_err(|source| Error::CommandSpawn {
            path: program,
            source,
        })
    })
    .await
}

/// Last non-empty lines of a process's stderr, for error messages
pub fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

/// Build an HTTP client for catalog and download requests
pub fn http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Get current platform string, in the Go/OCI naming used by catalogs and registries
pub fn platform_str() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

/// Get current architecture string, in Go/OCI naming
pub fn arch_str() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        arch => arch,
    }
}

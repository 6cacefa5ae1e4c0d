//! Tar → gunzip extraction pipeline
//!
//! A container copy yields a tar stream wrapping a single file, and that file
//! is often gzip-compressed. Two blocking stages run concurrently, joined by a
//! bounded in-memory pipe:
//!
//! ```text
//! tar stream ──▶ [un-tar] ──▶ duplex pipe ──▶ [gunzip] ──▶ destination file
//! ```
//!
//! Either stage failing closes its end of the pipe, which unblocks the other,
//! and both results are joined before returning. Nothing is buffered whole.

use crate::common::{Error, Result};
use crate::setup::installer::create_executable_file;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

/// Capacity of the in-memory pipe between the two stages
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// How the un-tar stage stopped
#[derive(Debug)]
enum UntarError {
    /// The archive itself was malformed, truncated or empty
    Archive(String),
    /// The destination stopped accepting bytes
    WriteFailed,
}

/// Unpack the first regular file of a tar stream into `dest`
///
/// The file is gunzipped when it starts with the gzip magic bytes and copied
/// verbatim otherwise. `dest` is created with mode 0711. Returns the number
/// of bytes written.
pub async fn extract_binary<R>(archive: R, dest: &Path) -> Result<u64>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let out = create_executable_file(dest)?;

    let (pipe_writer, pipe_reader) = tokio::io::duplex(PIPE_CAPACITY);
    let tar_input = SyncIoBridge::new(archive);
    let pipe_writer = SyncIoBridge::new(pipe_writer);
    let gz_input = SyncIoBridge::new(pipe_reader);

    let untar = tokio::task::spawn_blocking(move || untar_first_file(tar_input, pipe_writer));
    let gunzip = tokio::task::spawn_blocking(move || gunzip_if_compressed(gz_input, out));

    let (untar, gunzip) = tokio::join!(untar, gunzip);
    let untar = untar.map_err(|e| Error::Internal(format!("un-tar stage failed: {}", e)))?;
    let gunzip = gunzip.map_err(|e| Error::Internal(format!("gunzip stage failed: {}", e)))?;

    match (untar, gunzip) {
        (Ok(_), Ok(written)) => Ok(written),
        (Err(UntarError::Archive(message)), _) => Err(Error::Decompression(message)),
        (Err(UntarError::WriteFailed), Err(e)) | (Ok(_), Err(e)) => Err(e),
        (Err(UntarError::WriteFailed), Ok(_)) => Err(Error::Decompression(
            "output stage stopped before the archive entry was fully read".to_string(),
        )),
    }
}

/// Unpack the first regular file of a blocking tar reader into `dest` (mode 0711)
pub(crate) fn untar_to_file<R: Read>(reader: R, dest: &Path) -> Result<u64> {
    let mut out = create_executable_file(dest)?;
    let written = untar_first_file(reader, &mut out).map_err(|e| match e {
        UntarError::Archive(message) => Error::Decompression(message),
        UntarError::WriteFailed => {
            Error::Decompression(format!("Failed to write '{}'", dest.display()))
        }
    })?;
    out.flush()?;
    Ok(written)
}

/// Stream the first regular file in `reader` into `writer`
fn untar_first_file<R: Read, W: Write>(
    reader: R,
    mut writer: W,
) -> std::result::Result<u64, UntarError> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| UntarError::Archive(format!("Failed to read tar stream: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| UntarError::Archive(format!("Failed to read tar entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let expected = entry.size();
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<invalid path>".to_string());

        let mut buf = vec![0u8; 16 * 1024];
        let mut copied: u64 = 0;
        loop {
            let n = match entry.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(UntarError::Archive(format!(
                        "Failed to read '{}' from archive: {}",
                        name, e
                    )))
                }
            };
            writer
                .write_all(&buf[..n])
                .map_err(|_| UntarError::WriteFailed)?;
            copied += n as u64;
        }

        if copied != expected {
            return Err(UntarError::Archive(format!(
                "Archive truncated: '{}' has {} of {} bytes",
                name, copied, expected
            )));
        }
        writer.flush().map_err(|_| UntarError::WriteFailed)?;
        tracing::debug!(entry = %name, bytes = copied, "Un-tarred entry");
        return Ok(copied);
    }

    Err(UntarError::Archive(
        "Archive contains no regular file".to_string(),
    ))
}

/// Gunzip `reader` into `out` if it is gzip data, otherwise copy it as-is
fn gunzip_if_compressed<R: Read, W: Write>(reader: R, mut out: W) -> Result<u64> {
    let mut reader = BufReader::new(reader);
    let head = reader
        .fill_buf()
        .map_err(|e| Error::Decompression(format!("Failed to read archive entry: {}", e)))?;
    if head.is_empty() {
        return Err(Error::Decompression("Archive entry is empty".to_string()));
    }

    let written = if head.starts_with(&[0x1f, 0x8b]) {
        // Concatenated members decode as one stream
        let mut decoder = flate2::bufread::MultiGzDecoder::new(&mut reader);
        io::copy(&mut decoder, &mut out)
            .map_err(|e| Error::Decompression(format!("gunzip failed: {}", e)))?
    } else {
        io::copy(&mut reader, &mut out)
            .map_err(|e| Error::Decompression(format!("Failed to copy archive entry: {}", e)))?
    };

    out.flush()?;
    Ok(written)
}

//! Incremental reading and line splitting.
//!
//! The read cursor lives in the file handle itself. An unterminated trailing
//! fragment is never buffered: the handle is seeked back over it so the next
//! read picks it up again together with its delimiter.

use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads everything between the cursor and end of file and returns the
/// complete lines in it, delimiter stripped.
///
/// A read that yields nothing while the cursor sits past the end of the file
/// means the file was truncated in place; the whole file is read again from
/// the start. Truncation to a length that is still at or beyond the cursor is
/// indistinguishable from an append and is not detected.
pub(crate) async fn read_new_lines(file: &mut File, delimiter: u8) -> std::io::Result<Vec<Vec<u8>>> {
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;

    if buf.is_empty() {
        let position = file.stream_position().await?;
        let current_size = file.metadata().await?.len();
        if !detect_file_truncation(current_size, position) {
            return Ok(Vec::new());
        }

        tracing::debug!(position, current_size, "file truncated, reading from start");
        file.seek(SeekFrom::Start(0)).await?;
        file.read_to_end(&mut buf).await?;
    }

    let (mut lines, carry) = split_lines(&buf, delimiter);
    if let Some(first) = lines.first_mut() {
        trim_leading_nul(first);
    }
    if carry > 0 {
        let back = i64::try_from(carry).unwrap_or(i64::MAX);
        file.seek(SeekFrom::Current(-back)).await?;
    }

    Ok(lines)
}

/// Splits `content` on `delimiter`. Returns the complete lines and the length
/// of the unterminated fragment after the last delimiter.
fn split_lines(content: &[u8], delimiter: u8) -> (Vec<Vec<u8>>, usize) {
    let mut parts: Vec<&[u8]> = content.split(|b| *b == delimiter).collect();
    // `split` always yields at least one part; the last is never terminated.
    let carry = parts.pop().map_or(0, <[u8]>::len);
    (parts.into_iter().map(<[u8]>::to_vec).collect(), carry)
}

/// Drops NUL filler that shows up when a read races a truncate-then-rewrite.
/// Only the first line of a read can carry it.
fn trim_leading_nul(line: &mut Vec<u8>) {
    let start = line.iter().position(|b| *b != 0).unwrap_or(line.len());
    line.drain(..start);
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Whether `path` currently names the file behind `file`.
pub(crate) async fn is_same_file(file: &File, path: &Path) -> bool {
    let (Ok(open), Ok(named)) = (file.metadata().await, tokio::fs::metadata(path).await) else {
        return false;
    };
    same_identity(&open, &named)
}

#[cfg(unix)]
fn same_identity(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_identity(_a: &std::fs::Metadata, _b: &std::fs::Metadata) -> bool {
    false
}

//! Persists a finished match as a single zip archive.
//!
//! Layout:
//!
//! ```text
//! match.zip
//! ├── trace.json    per-tick world snapshots with submitted actions
//! └── result.json   { winner, disqualified?, stackTrace?, duration }
//! ```

use crate::result::MatchResult;
use crate::trace::Trace;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive entry holding the trace.
pub const TRACE_ENTRY: &str = "trace.json";

/// Archive entry holding the result.
pub const RESULT_ENTRY: &str = "result.json";

/// Errors writing or reading a match archive.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive is missing entry: {0}")]
    MissingEntry(&'static str),
}

/// Writes `trace` and `result` into a zip archive on `writer`.
///
/// Returns the writer once the archive's central directory is written.
pub fn write_archive<W, TR, TW, TA>(
    writer: W,
    trace: &Trace<TR, TW, TA>,
    result: &MatchResult,
) -> Result<W, RecordError>
where
    W: Write + Seek,
    TR: Serialize,
    TW: Serialize,
    TA: Serialize,
{
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);

    zip.start_file(TRACE_ENTRY, options)?;
    serde_json::to_writer(&mut zip, trace)?;

    zip.start_file(RESULT_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut zip, result)?;

    Ok(zip.finish()?)
}

/// Writes the archive to `path`, replacing any existing file.
pub fn write_archive_file<TR, TW, TA>(
    path: &Path,
    trace: &Trace<TR, TW, TA>,
    result: &MatchResult,
) -> Result<(), RecordError>
where
    TR: Serialize,
    TW: Serialize,
    TA: Serialize,
{
    let file = File::create(path)?;
    let mut writer = write_archive(BufWriter::new(file), trace, result)?;
    writer.flush()?;

    info!("Wrote {} trace entries to {}", trace.len(), path.display());
    Ok(())
}

/// Reads an archive produced by `write_archive`.
pub fn read_archive<R, TR, TW, TA>(reader: R) -> Result<(Trace<TR, TW, TA>, MatchResult), RecordError>
where
    R: Read + Seek,
    TR: DeserializeOwned,
    TW: DeserializeOwned,
    TA: DeserializeOwned,
{
    let mut archive = ZipArchive::new(reader)?;
    let trace = read_entry(&mut archive, TRACE_ENTRY)?;
    let result = read_entry(&mut archive, RESULT_ENTRY)?;
    Ok((trace, result))
}

fn read_entry<R, T>(archive: &mut ZipArchive<R>, name: &'static str) -> Result<T, RecordError>
where
    R: Read + Seek,
    T: DeserializeOwned,
{
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(RecordError::MissingEntry(name)),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_reader(entry)?)
}

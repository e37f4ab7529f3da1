// crates/perfgate-store/src/datafile.rs
// ============================================================================
// Module: Perfgate Datafile
// Description: Observation writer, reader and the on-disk document format.
// Purpose: Persist a run's observations atomically and replay them later.
// Dependencies: perfgate-core, serde, serde_json, tempfile, tracing
// ============================================================================

//! ## Overview
//! The datafile is a JSON document `{"format_version": 1, "observations": [..]}`
//! holding every observation a [`Writer`] saw between `start` and `end`. The
//! file is written once, through a temporary file in the target directory that
//! is then renamed over the destination, so readers never see a partial run.
//! An empty file is valid and holds no observations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use perfgate_core::Hub;
use perfgate_core::Observation;
use perfgate_core::PerfError;
use perfgate_core::Subscription;
use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Datafile document version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Largest datafile the reader accepts.
pub const MAX_DATAFILE_BYTES: u64 = 256 * 1024 * 1024;

/// Receiver label used on `results_collected`.
const WRITER_LABEL: &str = "datafile writer";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Datafile errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the datafile failed.
    #[error("datafile io error: {0}")]
    Io(String),
    /// Observations could not be encoded.
    #[error("datafile encode error: {0}")]
    Encode(String),
    /// The datafile content is not a valid document.
    #[error("datafile decode error: {0}")]
    Decode(String),
    /// The temporary file could not be moved into place.
    #[error("datafile persist error: {0}")]
    Persist(String),
    /// A receiver failed while replaying observations.
    #[error("datafile replay failed: {0}")]
    Dispatch(#[from] PerfError),
}

// ============================================================================
// SECTION: Document Format
// ============================================================================

/// Serialized form of a datafile.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    /// Format version of the document.
    format_version: u32,
    /// Observations in the order they were broadcast.
    observations: Vec<Observation>,
}

/// Encodes observations as a datafile document.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] when an observation cannot be serialized.
pub fn encode_observations(observations: &[Observation]) -> Result<Vec<u8>, StoreError> {
    /// Borrowed form of [`Document`].
    #[derive(Serialize)]
    struct DocumentRef<'a> {
        /// Format version of the document.
        format_version: u32,
        /// Observations in broadcast order.
        observations: &'a [Observation],
    }
    serde_json::to_vec(&DocumentRef {
        format_version: FORMAT_VERSION,
        observations,
    })
    .map_err(|err| StoreError::Encode(err.to_string()))
}

/// Decodes a datafile document; empty input yields no observations.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] for malformed documents or unknown versions.
pub fn decode_observations(bytes: &[u8]) -> Result<Vec<Observation>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let document: Document =
        serde_json::from_slice(bytes).map_err(|err| StoreError::Decode(err.to_string()))?;
    if document.format_version != FORMAT_VERSION {
        return Err(StoreError::Decode(format!(
            "unsupported format_version {} (expected {FORMAT_VERSION})",
            document.format_version
        )));
    }
    Ok(document.observations)
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Records collected observations and writes them to a datafile.
///
/// # Invariants
/// - Only observations broadcast between [`Writer::start`] and [`Writer::end`]
///   are recorded.
/// - The datafile is written exactly once per `end`.
pub struct Writer {
    /// Destination datafile.
    path: PathBuf,
    /// Hub whose `results_collected` channel is recorded.
    hub: Hub,
    /// Observations recorded since `start`.
    buffer: Arc<Mutex<Vec<Observation>>>,
    /// Live subscription while recording.
    subscription: Option<Subscription>,
}

impl Writer {
    /// Creates an inactive writer for `path`.
    #[must_use]
    pub fn new(hub: &Hub, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hub: hub.clone(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            subscription: None,
        }
    }

    /// Returns the destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the writer is recording.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Clears the buffer and starts recording. Restarting an active writer
    /// discards what it recorded so far.
    pub fn start(&mut self) {
        self.subscription = None;
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clear();
        let sink = Arc::clone(&self.buffer);
        let subscription = self.hub.results_collected().connect(WRITER_LABEL, move |observation| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(observation.clone());
            Ok(())
        });
        self.subscription = Some(subscription);
        debug!(path = %self.path.display(), "datafile writer started");
    }

    /// Records one observation directly.
    pub fn record(&self, observation: &Observation) {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).push(observation.clone());
    }

    /// Stops recording and writes the datafile, returning the number of observations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when encoding or writing fails.
    pub fn end(&mut self) -> Result<usize, StoreError> {
        self.subscription = None;
        let observations =
            std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let bytes = encode_observations(&observations)?;
        write_atomic(&self.path, &bytes)?;
        debug!(
            path = %self.path.display(),
            observations = observations.len(),
            bytes = bytes.len(),
            "datafile written"
        );
        Ok(observations.len())
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Writes `bytes` to a temporary file next to `path` and renames it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|err| StoreError::Io(err.to_string()))?;
    file.write_all(bytes).map_err(|err| StoreError::Io(err.to_string()))?;
    file.as_file().sync_all().map_err(|err| StoreError::Io(err.to_string()))?;
    file.persist(path).map_err(|err| StoreError::Persist(err.error.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Loads observations from a datafile.
#[derive(Debug, Clone)]
pub struct Reader {
    /// Source datafile.
    path: PathBuf,
}

impl Reader {
    /// Creates a reader for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every observation in the datafile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file cannot be read or decoded.
    pub fn read_all(&self) -> Result<Vec<Observation>, StoreError> {
        let size = fs::metadata(&self.path).map_err(|err| StoreError::Io(err.to_string()))?.len();
        if size > MAX_DATAFILE_BYTES {
            return Err(StoreError::Decode(format!("datafile exceeds {MAX_DATAFILE_BYTES} bytes")));
        }
        let bytes = fs::read(&self.path).map_err(|err| StoreError::Io(err.to_string()))?;
        let observations = decode_observations(&bytes)?;
        debug!(path = %self.path.display(), observations = observations.len(), "datafile read");
        Ok(observations)
    }

    /// Reads every observation and replays each one on `results_read`.
    ///
    /// Every observation is replayed even when a receiver fails; the first
    /// failure is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails or a receiver fails.
    pub fn read_and_broadcast(&self, hub: &Hub) -> Result<Vec<Observation>, StoreError> {
        let observations = self.read_all()?;
        let mut first_failure = None;
        for observation in &observations {
            if let Err(err) = hub.results_read().dispatch(observation)
                && first_failure.is_none()
            {
                first_failure = Some(err);
            }
        }
        match first_failure {
            Some(err) => Err(StoreError::Dispatch(err)),
            None => Ok(observations),
        }
    }
}

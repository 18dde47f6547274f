//! Artifact sink abstraction.
//!
//! The pipeline never performs I/O itself; after each completed stage the
//! executor serialises the stage artifact and hands the bytes to the sink.
//! `put` must be idempotent: repeated calls with identical bytes succeed.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("sink put failed for {name}: {reason}")]
pub struct SinkError {
    pub name: String,
    pub reason: String,
}

impl SinkError {
    pub fn new(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Destination for named JSON artifact blobs.
pub trait ArtifactSink {
    fn put(
        &self,
        job_id: &str,
        artifact_name: &str,
        artifact_type: &str,
        body: &[u8],
    ) -> Result<(), SinkError>;
}

/// In-memory sink used by tests and callers that post-process artifacts.
#[derive(Default)]
pub struct MemorySink {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str, artifact_name: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.lock().ok()?;
        blobs.get(&Self::key(job_id, artifact_name)).cloned()
    }

    pub fn names(&self, job_id: &str) -> Vec<String> {
        let prefix = format!("{job_id}/");
        match self.blobs.lock() {
            Ok(blobs) => blobs
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix).map(String::from))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn key(job_id: &str, artifact_name: &str) -> String {
        format!("{job_id}/{artifact_name}")
    }
}

impl ArtifactSink for MemorySink {
    fn put(
        &self,
        job_id: &str,
        artifact_name: &str,
        _artifact_type: &str,
        body: &[u8],
    ) -> Result<(), SinkError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| SinkError::new(artifact_name, "sink poisoned"))?;
        blobs.insert(Self::key(job_id, artifact_name), body.to_vec());
        Ok(())
    }
}

/// Sink writing each artifact as `<root>/<job_id>/<artifact_name>`.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSink for DirectorySink {
    fn put(
        &self,
        job_id: &str,
        artifact_name: &str,
        _artifact_type: &str,
        body: &[u8],
    ) -> Result<(), SinkError> {
        let dir = self.root.join(job_id);
        fs::create_dir_all(&dir).map_err(|e| SinkError::new(artifact_name, e.to_string()))?;
        fs::write(dir.join(artifact_name), body)
            .map_err(|e| SinkError::new(artifact_name, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_round_trip() {
        let sink = MemorySink::new();
        sink.put("job-1", "canvas_data.json", "canvas_data", b"{}")
            .unwrap();
        assert_eq!(sink.get("job-1", "canvas_data.json").unwrap(), b"{}");
        assert!(sink.get("job-2", "canvas_data.json").is_none());
    }

    #[test]
    fn memory_sink_put_is_idempotent() {
        let sink = MemorySink::new();
        sink.put("j", "a.json", "t", b"[1]").unwrap();
        sink.put("j", "a.json", "t", b"[1]").unwrap();
        assert_eq!(sink.names("j"), vec!["a.json".to_string()]);
    }
}

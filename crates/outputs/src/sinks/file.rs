//! FileOutput - appends events to a file as JSON lines

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contracts::{Batch, ContractError, FilteredEvent, MessageOutput, Output};
use serde_json::json;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

/// Output writing one JSON object per event
pub struct FileOutput {
    name: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileOutput {
    /// Open (or create) the file at `path` for appending
    pub async fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            name: name.into(),
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Create from params (for factory); requires `path`
    #[instrument(name = "file_output_from_params", skip(params))]
    pub async fn from_params(
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let path = params
            .get("path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ContractError::output_instantiation(name, "missing 'path' parameter"))?;

        Self::open(name, path)
            .await
            .map_err(|e| ContractError::output_connection(name, format!("{}: {}", path, e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(event: &FilteredEvent, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
        let inner = event.event();
        let line = json!({
            "offset": inner.offset,
            "timestamp": inner.timestamp,
            "source": inner.source,
            "message": inner.message,
            "fields": inner.fields,
            "streams": event.streams(),
            "destinations": event.destinations(),
        });
        serde_json::to_writer(&mut *out, &line)?;
        out.push(b'\n');
        Ok(())
    }

    async fn append(&self, events: &[FilteredEvent]) -> Result<(), ContractError> {
        let mut data = Vec::new();
        for event in events {
            Self::encode(event, &mut data)
                .map_err(|e| ContractError::output_delivery(&self.name, e.to_string()))?;
        }

        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| ContractError::output_delivery(&self.name, "file closed"))?;
        let result = async {
            file.write_all(&data).await?;
            file.flush().await
        }
        .await;

        result.map_err(|e| {
            error!(output = %self.name, path = %self.path.display(), error = %e, "Write failed");
            ContractError::output_delivery(&self.name, e.to_string())
        })
    }

    async fn shutdown(&self) -> Result<(), ContractError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.sync_all()
                .await
                .map_err(|e| ContractError::output_delivery(&self.name, e.to_string()))?;
        }
        debug!(output = %self.name, "FileOutput closed");
        Ok(())
    }
}

#[async_trait]
impl Output for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_output_deliver",
        skip(self, batch),
        fields(output = %self.name, events = batch.len())
    )]
    async fn deliver(&self, batch: &Batch) -> Result<(), ContractError> {
        self.append(batch.events()).await
    }

    async fn close(&self) -> Result<(), ContractError> {
        self.shutdown().await
    }
}

#[async_trait]
impl MessageOutput for FileOutput {
    fn id(&self) -> &str {
        &self.name
    }

    async fn write(&self, event: &FilteredEvent) -> Result<(), ContractError> {
        self.append(std::slice::from_ref(event)).await
    }

    async fn write_all(&self, events: &[FilteredEvent]) -> Result<(), ContractError> {
        self.append(events).await
    }

    async fn stop(&self) -> Result<(), ContractError> {
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Event;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_output_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let output = FileOutput::open("archive", &path).await.unwrap();

        let batch = Batch::new(vec![
            FilteredEvent::from_event(Event::new(1, "first").with_stream("errors")),
            FilteredEvent::from_event(Event::new(2, "second").with_field("level", 3)),
        ]);
        output.deliver(&batch).await.unwrap();
        output.write(&batch.events()[0]).await.unwrap();
        Output::close(&output).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["message"], "first");
        assert_eq!(lines[0]["streams"][0], "errors");
        assert_eq!(lines[1]["fields"]["level"], 3);
        assert_eq!(lines[2]["offset"], 1);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let output = FileOutput::open("archive", dir.path().join("e.jsonl"))
            .await
            .unwrap();
        output.stop().await.unwrap();
        let event = FilteredEvent::from_event(Event::new(1, "late"));
        assert!(output.write(&event).await.is_err());
    }

    #[tokio::test]
    async fn test_from_params_requires_path() {
        let err = FileOutput::from_params("f", &HashMap::new()).await.err().unwrap();
        assert!(matches!(err, ContractError::OutputInstantiation { .. }));
    }
}

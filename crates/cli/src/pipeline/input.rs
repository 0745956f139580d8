//! Newline-delimited JSON event input.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{Event, Offset};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CliError, Result};

/// Where events are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Stdin,
    File(PathBuf),
}

impl EventSource {
    /// `None` and `-` select stdin
    pub fn from_arg(path: Option<&Path>) -> Self {
        match path {
            Some(p) if p != Path::new("-") => Self::File(p.to_path_buf()),
            _ => Self::Stdin,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    pub async fn open(&self) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            Self::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| CliError::input_open(path.display().to_string(), e))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Parses input lines and assigns consecutive journal offsets
#[derive(Debug)]
pub struct EventDecoder {
    next_offset: Offset,
}

impl EventDecoder {
    pub fn new(start_offset: Offset) -> Self {
        Self {
            next_offset: start_offset,
        }
    }

    /// Decode one line; blank lines yield `None`
    ///
    /// Only successfully decoded events consume an offset.
    pub fn decode(&mut self, line: &str) -> Option<std::result::Result<Event, serde_json::Error>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(serde_json::from_str::<Event>(line).map(|mut event| {
            event.offset = self.next_offset;
            self.next_offset += 1;
            event
        }))
    }
}

/// Input progress shared with the producers
#[derive(Debug, Default)]
pub struct InputCounters {
    pub read: AtomicU64,
    pub skipped: AtomicU64,
    pub written: AtomicU64,
    pub rejected: AtomicU64,
}

impl InputCounters {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read every line of `reader` into `tx` until EOF or until all receivers are gone
pub async fn read_events<R>(
    reader: R,
    mut decoder: EventDecoder,
    tx: mpsc::Sender<Event>,
    counters: &InputCounters,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match decoder.decode(&line) {
            None => continue,
            Some(Ok(event)) => {
                InputCounters::bump(&counters.read);
                if tx.send(event).await.is_err() {
                    debug!(line = line_no, "All producers gone, stopping input");
                    break;
                }
            }
            Some(Err(e)) => {
                InputCounters::bump(&counters.skipped);
                warn!(line = line_no, error = %e, "Skipping malformed event");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_arg() {
        assert_eq!(EventSource::from_arg(None), EventSource::Stdin);
        assert_eq!(EventSource::from_arg(Some(Path::new("-"))), EventSource::Stdin);
        assert_eq!(
            EventSource::from_arg(Some(Path::new("events.ndjson"))),
            EventSource::File(PathBuf::from("events.ndjson"))
        );
    }

    #[test]
    fn test_decoder_assigns_offsets_to_valid_lines_only() {
        let mut decoder = EventDecoder::new(10);
        let first = decoder.decode(r#"{"message":"a","offset":999}"#).unwrap().unwrap();
        assert!(decoder.decode("   ").is_none());
        assert!(decoder.decode("{not json").unwrap().is_err());
        let second = decoder
            .decode(r#"{"message":"b","streams":["errors"],"destinations":["idx-1","idx-2"]}"#)
            .unwrap()
            .unwrap();

        assert_eq!(first.offset, 10);
        assert_eq!(second.offset, 11);
        assert!(second.streams.contains("errors"));
        assert_eq!(second.destinations.len(), 2);
    }

    #[tokio::test]
    async fn test_read_events_counts_skipped_lines() {
        let input = b"{\"message\":\"a\"}\n\ngarbage\n{\"message\":\"b\"}\n";
        let (tx, mut rx) = mpsc::channel(8);
        let counters = InputCounters::default();

        read_events(&input[..], EventDecoder::new(0), tx, &counters)
            .await
            .unwrap();

        let mut offsets = Vec::new();
        while let Some(event) = rx.recv().await {
            offsets.push(event.offset);
        }
        assert_eq!(offsets, vec![0, 1]);
        assert_eq!(InputCounters::get(&counters.read), 2);
        assert_eq!(InputCounters::get(&counters.skipped), 1);
    }
}

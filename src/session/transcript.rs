use super::*;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::validate::StageStatus;

/// Transcript recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptLevel {
    Off,
    /// Everything except raw terminal chunks.
    #[default]
    KeyEventsOnly,
    Full,
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptEntry {
    pub ts_ms: u128,
    pub event: TranscriptEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEvent {
    StageStarted {
        stage: u8,
        label: String,
    },
    StageFinished {
        stage: u8,
        label: String,
        status: StageStatus,
        #[serde(default)]
        error: Option<String>,
    },
    CliSent {
        command: String,
    },
    CliReceived {
        command: String,
        success: bool,
        content: String,
    },
    RawChunk {
        data: String,
    },
    RpcSent {
        document: String,
    },
    RpcReceived {
        document: String,
    },
    /// The `<config>` payload of the edit request.
    EditPayload {
        config: String,
    },
    Note {
        message: String,
    },
}

/// In-memory run transcript shared by both sessions and the orchestrator.
#[derive(Debug, Clone)]
pub struct Transcript {
    level: TranscriptLevel,
    entries: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(TranscriptLevel::default())
    }
}

impl Transcript {
    pub fn new(level: TranscriptLevel) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn level(&self) -> TranscriptLevel {
        self.level
    }

    pub fn record(&self, event: TranscriptEvent) -> Result<(), VerifyError> {
        if self.level == TranscriptLevel::Off {
            return Ok(());
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| VerifyError::InternalServerError(format!("transcript lock error: {e}")))?;
        guard.push(TranscriptEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Records a raw terminal chunk when the level is `Full`.
    pub fn record_raw_chunk(&self, data: &str) -> Result<(), VerifyError> {
        if self.level != TranscriptLevel::Full {
            return Ok(());
        }
        self.record(TranscriptEvent::RawChunk {
            data: data.to_string(),
        })
    }

    pub fn note(&self, message: impl Into<String>) {
        let _ = self.record(TranscriptEvent::Note {
            message: message.into(),
        });
    }

    pub fn entries(&self) -> Result<Vec<TranscriptEntry>, VerifyError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| VerifyError::InternalServerError(format!("transcript lock error: {e}")))?;
        Ok(guard.clone())
    }

    pub fn to_jsonl(&self) -> Result<String, VerifyError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                VerifyError::InternalServerError(format!("transcript encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    pub fn from_jsonl(jsonl: &str) -> Result<Self, VerifyError> {
        let transcript = Self::new(TranscriptLevel::Full);
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TranscriptEntry = serde_json::from_str(line).map_err(|e| {
                VerifyError::InternalServerError(format!("transcript decode error: {e}"))
            })?;
            parsed.push(entry);
        }

        let mut guard = transcript
            .entries
            .lock()
            .map_err(|e| VerifyError::InternalServerError(format!("transcript lock error: {e}")))?;
        *guard = parsed;
        drop(guard);

        Ok(transcript)
    }

    /// Human-readable log of the run.
    pub fn render_text(&self) -> Result<String, VerifyError> {
        let mut out = String::new();
        for entry in self.entries()? {
            match entry.event {
                TranscriptEvent::StageStarted { stage, label } => {
                    out.push_str(&format!("\n========== {stage}. {label} ==========\n"));
                }
                TranscriptEvent::StageFinished {
                    stage,
                    status,
                    error,
                    ..
                } => {
                    out.push_str(&format!("---------- stage {stage}: {status} ----------\n"));
                    if let Some(error) = error {
                        out.push_str(&format!("error: {error}\n"));
                    }
                }
                TranscriptEvent::CliSent { command } => {
                    out.push_str(&format!("CLI >>> {command}\n"));
                }
                TranscriptEvent::CliReceived { content, .. } => {
                    push_block(&mut out, &content);
                }
                TranscriptEvent::RawChunk { .. } => {}
                TranscriptEvent::RpcSent { document } => {
                    out.push_str("NETCONF >>>\n");
                    push_block(&mut out, &document);
                }
                TranscriptEvent::RpcReceived { document } => {
                    out.push_str("NETCONF <<<\n");
                    push_block(&mut out, &document);
                }
                TranscriptEvent::EditPayload { config } => {
                    out.push_str("EDIT-CONFIG payload:\n");
                    push_block(&mut out, &config);
                }
                TranscriptEvent::Note { message } => {
                    push_block(&mut out, &message);
                }
            }
        }
        Ok(out)
    }
}

fn push_block(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_jsonl_roundtrip() {
        let transcript = Transcript::new(TranscriptLevel::Full);
        transcript
            .record(TranscriptEvent::StageFinished {
                stage: 4,
                label: "CLI - Rollback Configuration".to_string(),
                status: StageStatus::Fail,
                error: Some("operation timeout: ".to_string()),
            })
            .expect("record stage");

        let jsonl = transcript.to_jsonl().expect("encode jsonl");
        assert!(jsonl.contains(r#""kind":"stage_finished""#));
        assert!(jsonl.contains(r#""status":"FAIL""#));

        let restored = Transcript::from_jsonl(&jsonl).expect("decode jsonl");
        assert_eq!(
            restored.entries().expect("entries"),
            transcript.entries().expect("entries")
        );
    }

    #[test]
    fn off_level_records_nothing() {
        let transcript = Transcript::new(TranscriptLevel::Off);
        transcript.note("ignored");
        assert!(transcript.entries().expect("entries").is_empty());
    }

    #[test]
    fn raw_chunks_need_full_level() {
        let key_events = Transcript::new(TranscriptLevel::KeyEventsOnly);
        key_events.record_raw_chunk("abc").expect("record chunk");
        assert!(key_events.entries().expect("entries").is_empty());

        let full = Transcript::new(TranscriptLevel::Full);
        full.record_raw_chunk("abc").expect("record chunk");
        assert_eq!(full.entries().expect("entries").len(), 1);
    }

    #[test]
    fn render_text_shows_both_protocols() {
        let transcript = Transcript::default();
        transcript
            .record(TranscriptEvent::StageStarted {
                stage: 2,
                label: "CLI - Send Configuration".to_string(),
            })
            .expect("record");
        transcript
            .record(TranscriptEvent::CliSent {
                command: "hostname r1".to_string(),
            })
            .expect("record");
        transcript
            .record(TranscriptEvent::RpcSent {
                document: "<commit/>".to_string(),
            })
            .expect("record");
        transcript
            .record(TranscriptEvent::RawChunk {
                data: "noise".to_string(),
            })
            .expect("record");

        let text = transcript.render_text().expect("render");
        assert!(text.contains("========== 2. CLI - Send Configuration =========="));
        assert!(text.contains("CLI >>> hostname r1\n"));
        assert!(text.contains("NETCONF >>>\n<commit/>\n"));
        assert!(!text.contains("noise"));
    }

    #[test]
    fn malformed_jsonl_is_reported() {
        let err = Transcript::from_jsonl("{not json}").expect_err("bad jsonl");
        assert!(matches!(err, VerifyError::InternalServerError(_)));
    }
}

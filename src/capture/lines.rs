use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::recognizer::{PermissionState, RecognizerEvent, SpeechRecognizer};
use crate::error::CaptureError;

/// Recognizer that treats each non-empty input line as a final transcript
/// with full confidence. Used by the demo client to drive sessions from a
/// terminal.
pub struct LineRecognizer {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    closed: watch::Receiver<bool>,
    reader_task: JoinHandle<()>,
    run_task: Option<JoinHandle<()>>,
}

impl LineRecognizer {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (line_tx, line_rx) = mpsc::channel(32);
        let (closed_tx, closed) = watch::channel(false);

        let reader_task = tokio::spawn(async move {
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            debug!("Line input closed");
            closed_tx.send_replace(true);
        });

        Self {
            lines: Arc::new(Mutex::new(line_rx)),
            closed,
            reader_task,
            run_task: None,
        }
    }

    /// Flips to `true` once the underlying reader hits end of input
    pub fn input_closed(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for LineRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    async fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<RecognizerEvent>, CaptureError> {
        self.stop().await;

        let (tx, rx) = mpsc::channel(16);
        let lines = Arc::clone(&self.lines);

        self.run_task = Some(tokio::spawn(async move {
            let mut lines = lines.lock().await;
            loop {
                match lines.recv().await {
                    Some(line) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        let event = RecognizerEvent::Result {
                            text: text.to_string(),
                            confidence: 1.0,
                            is_final: true,
                        };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = tx.send(RecognizerEvent::End).await;
                        break;
                    }
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(task) = self.run_task.take() {
            task.abort();
        }
    }

    fn name(&self) -> &str {
        "line-input"
    }
}

impl Drop for LineRecognizer {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = self.run_task.take() {
            task.abort();
        }
    }
}

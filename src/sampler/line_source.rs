use crate::models::{FeedLine, RawFix, SourceError};
use crate::sampler::source::{FixSink, PositionSource, WatchId, WatchOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type SharedLines<R> = Arc<tokio::sync::Mutex<Lines<BufReader<R>>>>;

/// Position source fed by newline-delimited JSON, one fix (or
/// `{"error": {...}}` report) per line.
pub struct LineSource<R> {
    lines: SharedLines<R>,
    watches: Mutex<HashMap<WatchId, CancellationToken>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(BufReader::new(reader).lines())),
            watches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
        }
    }

    /// Cancelled once the feed reaches end of input.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[async_trait]
impl<R> PositionSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn watch(&self, sink: FixSink, options: WatchOptions) -> WatchId {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.clone());

        let lines = Arc::clone(&self.lines);
        let closed = self.closed.clone();
        tokio::spawn(async move {
            loop {
                let report = tokio::select! {
                    _ = token.cancelled() => break,
                    report = next_report(&lines, options.timeout) => report,
                };
                match report {
                    Some(report) => sink(report),
                    None => {
                        info!("Fix feed reached end of input");
                        closed.cancel();
                        break;
                    }
                }
            }
            debug!("Watch {:?} finished", id);
        });

        id
    }

    fn clear_watch(&self, id: WatchId) {
        let token = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(token) = token {
            token.cancel();
        }
    }

    async fn current_position(&self, options: WatchOptions) -> Result<RawFix, SourceError> {
        match next_report(&self.lines, options.timeout).await {
            Some(report) => report,
            None => {
                self.closed.cancel();
                Err(SourceError::new(
                    SourceError::POSITION_UNAVAILABLE,
                    "Fix feed is closed",
                ))
            }
        }
    }
}

/// Reads the next non-blank line. `None` means end of input.
async fn next_report<R>(
    lines: &SharedLines<R>,
    timeout: Duration,
) -> Option<Result<RawFix, SourceError>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = lines.lock().await;
    loop {
        let line = match tokio::time::timeout(timeout, lines.next_line()).await {
            Err(_) => {
                return Some(Err(SourceError::new(
                    SourceError::TIMEOUT,
                    format!("No fix within {:?}", timeout),
                )))
            }
            Ok(Err(e)) => {
                return Some(Err(SourceError::new(
                    SourceError::POSITION_UNAVAILABLE,
                    format!("Fix feed read failed: {}", e),
                )))
            }
            Ok(Ok(None)) => return None,
            Ok(Ok(Some(line))) => line,
        };

        if line.trim().is_empty() {
            continue;
        }

        return Some(match serde_json::from_str::<FeedLine>(&line) {
            Ok(FeedLine::Fix(fix)) => Ok(fix),
            Ok(FeedLine::Error { error }) => Err(error),
            Err(e) => Err(SourceError::new(0, format!("Malformed fix: {}", e))),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn channel_sink() -> (FixSink, mpsc::UnboundedReceiver<Result<RawFix, SourceError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: FixSink = Arc::new(move |report| {
            let _ = tx.send(report);
        });
        (sink, rx)
    }

    #[tokio::test]
    async fn test_reads_fixes_and_errors_until_eof() {
        let feed = concat!(
            r#"{"timestamp":1705314600000,"latitude":-23.55,"longitude":-46.63}"#,
            "\n\n",
            r#"{"error":{"code":1,"message":"denied"}}"#,
            "\n",
            "not json\n",
        );
        let source = LineSource::new(Cursor::new(feed.as_bytes().to_vec()));
        let closed = source.closed();
        let (sink, mut rx) = channel_sink();

        source.watch(sink, WatchOptions::default());

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.timestamp, 1_705_314_600_000);
        let second = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(second.code, SourceError::PERMISSION_DENIED);
        let third = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(third.code, 0);
        assert!(third.message.starts_with("Malformed fix"));

        closed.cancelled().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_timeout_and_keeps_watching() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let source = LineSource::new(reader);
        let (sink, mut rx) = channel_sink();
        let options = WatchOptions {
            timeout: Duration::from_secs(5),
            ..WatchOptions::default()
        };

        let id = source.watch(sink, options);

        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code, SourceError::TIMEOUT);

        writer
            .write_all(b"{\"timestamp\":42,\"lat\":1,\"lng\":2}\n")
            .await
            .unwrap();
        let mut fix = rx.recv().await.unwrap();
        while fix.is_err() {
            fix = rx.recv().await.unwrap();
        }
        assert_eq!(fix.unwrap().timestamp, 42);

        source.clear_watch(id);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_current_position_reads_one_fix() {
        let source = LineSource::new(Cursor::new(
            b"{\"timestamp\":7,\"latitude\":1.0,\"longitude\":2.0}\n".to_vec(),
        ));
        let fix = source
            .current_position(WatchOptions::default())
            .await
            .unwrap();
        assert_eq!(fix, RawFix::new(7, 1.0, 2.0));

        let err = source
            .current_position(WatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, SourceError::POSITION_UNAVAILABLE);
        assert!(source.closed().is_cancelled());
    }
}

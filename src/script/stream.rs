//! Combined stdout/stderr line stream.
//!
//! The script writes both streams into one pipe. A single reader task
//! splits it into lines and forwards them through a bounded channel, so
//! lines arrive in the order the script wrote them.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default capacity of the line channel.
pub const DEFAULT_LINE_BUFFER: usize = 256;

/// Error type for stream operations.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Failed to read script output: {0}")]
    Read(#[source] std::io::Error),
    #[error("Process output pipe not available")]
    NoOutput,
}

/// Receiving end of a merged output stream.
///
/// The reader task is aborted when this value is dropped.
#[derive(Debug)]
pub struct MergedLines {
    rx: mpsc::Receiver<Result<String, StreamError>>,
    reader: JoinHandle<()>,
}

impl MergedLines {
    /// Start reading `output` into a line channel.
    ///
    /// The stream ends at EOF, which arrives once every holder of the write
    /// end (the script and anything it spawned) has closed it.
    #[must_use]
    pub fn spawn<R>(output: R, buffer: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let reader = tokio::spawn(pump_lines(output, tx));
        Self { rx, reader }
    }

    /// Receive the next line, or `None` once the pipe is closed.
    pub async fn next_line(&mut self) -> Option<Result<String, StreamError>> {
        self.rx.recv().await
    }
}

impl Drop for MergedLines {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read lines until EOF, read failure, or receiver drop.
async fn pump_lines<R>(output: R, tx: mpsc::Sender<Result<String, StreamError>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(decode_line(&buf))).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::error!(%error, "Output read failed");
                let _ = tx.send(Err(StreamError::Read(error))).await;
                break;
            }
        }
    }

    tracing::trace!("Output pipe closed");
}

/// Decode raw bytes into a line, stripping the terminator.
///
/// Invalid UTF-8 is replaced rather than treated as a read failure.
#[must_use]
pub fn decode_line(bytes: &[u8]) -> String {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}

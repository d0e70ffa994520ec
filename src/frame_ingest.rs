//! Component A: Frame Ingest.
//!
//! Reads length-prefixed JPEG frames from one TCP connection and hands each
//! to the Recognition Worker via a bounded drop-oldest queue, so a slow
//! recognizer never backpressures the camera.

use crate::config::FrameIngestConfig;
use crate::error::{OrchestratorError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

const MAGIC: &[u8; 4] = b"VXL0";

/// A decoded, still-encoded JPEG frame payload ready for recognition.
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
}

/// A bounded drop-oldest queue: `put` never blocks the producer, evicting
/// the oldest entry when full instead.
pub struct FrameQueue {
    capacity: usize,
    state: Mutex<VecDeque<Frame>>,
    notify: Notify,
    dropped: std::sync::atomic::AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Push a frame, dropping the oldest queued frame if already at capacity.
    pub fn put(&self, frame: Frame) {
        let mut guard = self.state.lock().expect("frame queue mutex poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        guard.push_back(frame);
        drop(guard);
        self.notify.notify_one();
    }

    /// Await and remove the oldest frame.
    pub async fn get(&self) -> Frame {
        loop {
            {
                let mut guard = self.state.lock().expect("frame queue mutex poisoned");
                if let Some(frame) = guard.pop_front() {
                    return frame;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("frame queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse one `VXL0` framed record from a byte buffer that already contains
/// the full record. Used directly by tests; the live path reads the header
/// and payload off the socket separately (see [`run`]).
pub fn validate_payload_len(n: u32, max_payload_bytes: usize) -> Result<usize> {
    let n = n as usize;
    if n == 0 || n > max_payload_bytes {
        return Err(OrchestratorError::Frame(format!(
            "payload length {n} out of range (0, {max_payload_bytes}]"
        )));
    }
    Ok(n)
}

/// Accept one TCP connection and read frames from it until the connection
/// closes or the consecutive-error budget is exhausted.
pub async fn run(config: FrameIngestConfig, queue: std::sync::Arc<FrameQueue>) -> Result<()> {
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(OrchestratorError::Io)?;
    tracing::info!(addr = %config.bind_addr, "frame ingest listening");

    loop {
        let accept = timeout(
            Duration::from_secs(config.accept_timeout_secs),
            listener.accept(),
        )
        .await;
        let stream = match accept {
            Ok(Ok((stream, peer))) => {
                tracing::info!(%peer, "frame source connected");
                stream
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "frame accept failed");
                continue;
            }
            Err(_) => continue,
        };

        if let Err(e) = read_frames(stream, &config, &queue).await {
            tracing::error!(error = %e, "frame ingest connection terminated");
        }
    }
}

async fn read_frames(
    mut stream: TcpStream,
    config: &FrameIngestConfig,
    queue: &std::sync::Arc<FrameQueue>,
) -> Result<()> {
    let mut consecutive_errors: u32 = 0;

    loop {
        match read_one_frame(&mut stream, config).await {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                queue.put(frame);
            }
            Ok(None) => return Ok(()), // clean EOF
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(error = %e, consecutive_errors, "frame read error");
                if consecutive_errors > config.max_consecutive_errors {
                    return Err(OrchestratorError::Frame(format!(
                        "{} consecutive errors, terminating ingest",
                        consecutive_errors
                    )));
                }
            }
        }
    }
}

async fn read_one_frame(
    stream: &mut TcpStream,
    config: &FrameIngestConfig,
) -> Result<Option<Frame>> {
    let mut header = [0u8; 8];
    let read = timeout(
        Duration::from_secs(config.read_timeout_secs),
        stream.read_exact(&mut header),
    )
    .await;

    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(e)) => return Err(OrchestratorError::Io(e)),
        Err(_) => return Err(OrchestratorError::Frame("read timed out".to_owned())),
    }

    if &header[0..4] != MAGIC {
        return Err(OrchestratorError::Frame("bad magic".to_owned()));
    }
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let n = validate_payload_len(len, config.max_payload_bytes)?;

    let mut jpeg = vec![0u8; n];
    timeout(
        Duration::from_secs(config.read_timeout_secs),
        stream.read_exact(&mut jpeg),
    )
    .await
    .map_err(|_| OrchestratorError::Frame("payload read timed out".to_owned()))?
    .map_err(OrchestratorError::Io)?;

    Ok(Some(Frame { jpeg }))
}

/// Write one framed record to `stream` (used by tests and by any future
/// replay tooling).
pub async fn write_frame(stream: &mut TcpStream, jpeg: &[u8]) -> Result<()> {
    stream.write_all(MAGIC).await.map_err(OrchestratorError::Io)?;
    stream
        .write_all(&(jpeg.len() as u32).to_be_bytes())
        .await
        .map_err(OrchestratorError::Io)?;
    stream.write_all(jpeg).await.map_err(OrchestratorError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_payload_len_rejects_zero() {
        assert!(validate_payload_len(0, 5 * 1024 * 1024).is_err());
    }

    #[test]
    fn validate_payload_len_rejects_oversize() {
        assert!(validate_payload_len(6 * 1024 * 1024, 5 * 1024 * 1024).is_err());
    }

    #[test]
    fn validate_payload_len_accepts_in_range() {
        assert_eq!(validate_payload_len(1024, 5 * 1024 * 1024).unwrap(), 1024);
    }

    #[tokio::test]
    async fn queue_drops_oldest_when_full() {
        let queue = FrameQueue::new(2);
        queue.put(Frame { jpeg: vec![1] });
        queue.put(Frame { jpeg: vec![2] });
        queue.put(Frame { jpeg: vec![3] });

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len(), 2);
        let first = queue.get().await;
        assert_eq!(first.jpeg, vec![2]);
    }

    #[tokio::test]
    async fn queue_never_exceeds_capacity_under_fast_producer() {
        let queue = std::sync::Arc::new(FrameQueue::new(2));
        for i in 0..100u8 {
            queue.put(Frame { jpeg: vec![i] });
            assert!(queue.len() <= 2);
        }
    }
}

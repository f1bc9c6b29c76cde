//! Module `upload`
//!
//! Feeds an upload arriving on the async control connection into the blocking
//! storage engine without buffering the whole payload.

use log::{debug, error, warn};
use std::io::{self, Read};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const BUFFER_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

/// Blocking reader over chunks sent from an async task.
///
/// Reports end of file once the sending side is dropped.
pub struct ChannelReader {
    receiver: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    position: usize,
}

impl ChannelReader {
    fn new(receiver: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            receiver,
            chunk: Vec::new(),
            position: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.chunk.len() {
            match self.receiver.blocking_recv() {
                Some(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.position = 0;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.chunk.len() - self.position);
        buf[..n].copy_from_slice(&self.chunk[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Reads exactly `size` bytes from `source` and hands them to `store`, which
/// runs on the blocking pool.
///
/// If `store` gives up early the remaining bytes are still drained, so the
/// connection stays in sync. A connection that closes before `size` bytes
/// arrived fails both `store` and the returned result.
pub async fn receive_upload<R, T, F>(source: &mut R, size: u64, store: F) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: Send + 'static,
    F: FnOnce(ChannelReader) -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(CHANNEL_DEPTH);
    let task = tokio::task::spawn_blocking(move || store(ChannelReader::new(receiver)));

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut remaining = size;
    let mut consumer_alive = true;

    while remaining > 0 {
        let want = remaining.min(BUFFER_SIZE as u64) as usize;
        let n = match source.read(&mut buffer[..want]).await {
            Ok(0) => {
                warn!("Connection closed with {} upload bytes outstanding", remaining);
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "upload truncated");
                if consumer_alive {
                    let _ = sender.send(Err(eof)).await;
                }
                drop(sender);
                let _ = task.await;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during upload",
                ));
            }
            Ok(n) => n,
            Err(e) => {
                error!("Failed to read upload: {}", e);
                if consumer_alive {
                    let _ = sender.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                }
                drop(sender);
                let _ = task.await;
                return Err(e);
            }
        };

        remaining -= n as u64;
        if consumer_alive && sender.send(Ok(buffer[..n].to_vec())).await.is_err() {
            debug!("Upload consumer finished early, draining {} bytes", remaining);
            consumer_alive = false;
        }
    }

    drop(sender);
    task.await.map_err(io::Error::other)
}

//! Module `download`
//!
//! Streams a stored file to the client.

use log::info;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::storage::FileStream;

/// Copies exactly the size recorded at open time; returns bytes sent.
pub async fn send_file<W>(stream: FileStream, writer: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let size = stream.size();
    let path = stream.path().to_path_buf();
    let file = tokio::fs::File::from_std(stream.into_file());

    let sent = tokio::io::copy(&mut file.take(size), writer).await?;
    writer.flush().await?;

    if sent < size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} shrank during download", path.display()),
        ));
    }

    info!("Sent {} bytes of {}", sent, path.display());
    Ok(sent)
}

use crate::error::SocketError;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A message past this size is a protocol
/// violation, not market data.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Write one length-prefixed frame (u32 big-endian length, then payload),
/// failing with [`SocketError::Timeout`] past the deadline.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    deadline: Duration,
) -> Result<(), SocketError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_BYTES {
        return Err(SocketError::FrameTooLarge(payload.len()));
    }

    let write = async {
        writer.write_u32(payload.len() as u32).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok::<_, std::io::Error>(())
    };

    match tokio::time::timeout(deadline, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(SocketError::from_io(error)),
        Err(_) => Err(SocketError::Timeout),
    }
}

/// Read one length-prefixed frame, failing with [`SocketError::Timeout`] past
/// the deadline and [`SocketError::Closed`] on EOF.
pub async fn read_frame<R>(reader: &mut R, deadline: Duration) -> Result<Bytes, SocketError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(deadline, read_frame_inner(reader)).await {
        Ok(result) => result,
        Err(_) => Err(SocketError::Timeout),
    }
}

/// Read one frame with no deadline. Used by subscriber pump loops that park
/// on the wire until the publisher sends or closes.
pub async fn read_frame_unbounded<R>(reader: &mut R) -> Result<Bytes, SocketError>
where
    R: AsyncRead + Unpin,
{
    read_frame_inner(reader).await
}

async fn read_frame_inner<R>(reader: &mut R) -> Result<Bytes, SocketError>
where
    R: AsyncRead + Unpin,
{
    let length = reader
        .read_u32()
        .await
        .map_err(SocketError::from_io)? as usize;

    if length > MAX_FRAME_BYTES {
        return Err(SocketError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(SocketError::from_io)?;

    Ok(Bytes::from(payload))
}

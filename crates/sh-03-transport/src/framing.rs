//! # Length-Prefixed Framing
//!
//! ```text
//! ┌───────────────┬──────────────────────────────┐
//! │ 4 bytes (BE)  │  frame (pipeline output)     │
//! │ frame length  │                              │
//! └───────────────┴──────────────────────────────┘
//! ```
//!
//! The length is checked before the body is allocated. End of stream is
//! clean only between frames: a stream that stops inside the length prefix
//! or the body is an error.

use crate::errors::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Read one frame. `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        match reader.read(&mut prefix[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {filled} of {LENGTH_PREFIX} length bytes"),
                )
                .into())
            }
            n => filled += n,
        }
    }

    let size = u32::from_be_bytes(prefix) as usize;
    if size > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }

    let mut frame = vec![0u8; size];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8], max_frame_size: usize) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: frame.len(),
            max: max_frame_size,
        });
    }
    // max_frame_size is far below u32::MAX in any sane config
    let size = u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
        size: frame.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&size.to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_in_order() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, b"first", 64).await.unwrap();
        write_frame(&mut a, b"", 64).await.unwrap();
        write_frame(&mut a, b"third", 64).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(b"third".to_vec()));
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected_before_allocation() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        assert!(matches!(
            read_frame(&mut b, 1024).await,
            Err(TransportError::FrameTooLarge { size, max: 1024 }) if size == u32::MAX as usize
        ));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (mut a, _b) = tokio::io::duplex(64);
        assert!(matches!(
            write_frame(&mut a, &[0u8; 10], 9).await,
            Err(TransportError::FrameTooLarge { size: 10, max: 9 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0x00, 0x00]).await.unwrap();
        drop(a);

        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(TransportError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn test_prefix_split_across_writes() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            a.write_all(&[0x00, 0x00]).await.unwrap();
            tokio::task::yield_now().await;
            a.write_all(&[0x00, 0x03]).await.unwrap();
            a.write_all(b"abc").await.unwrap();
        });

        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(b"abc".to_vec()));
        writer.await.unwrap();
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&8u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b, 64).await, Err(TransportError::Io(_))));
    }
}

//! Async frame read/write over any byte stream.
//!
//! `write_frame` copies header and body into one buffer and issues a single
//! `write_all`, so a caller holding the connection's write lock puts the
//! whole frame on the wire contiguously. `read_frame` pulls exactly 14
//! header bytes, validates them, then pulls exactly `body_len` body bytes.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{Result, RpcError};

/// Maximum accepted frame body (64 MiB). Guards against hostile headers
/// asking the reader to allocate arbitrary amounts of memory.
pub const MAX_BODY_LEN: u32 = 64 * 1024 * 1024;

/// Write a complete frame (header + body) to `writer`.
///
/// The caller must hold the connection's write lock if multiple tasks share
/// the writer, otherwise frames from different requests will interleave and
/// corrupt the stream.
pub async fn write_frame<W>(writer: &mut W, header: &Header, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug_assert_eq!(header.body_len as usize, body.len());
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one complete frame (header + body) from `reader`.
///
/// Returns a validation error for bad magic/version/codec/message type, or
/// the underlying I/O error on a short read. Either is fatal for the
/// connection.
pub async fn read_frame<R>(reader: &mut R) -> Result<(Header, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head).await?;
    let header = Header::decode(&head)?;

    if header.body_len > MAX_BODY_LEN {
        return Err(RpcError::BodyTooLarge(header.body_len, MAX_BODY_LEN));
    }

    let mut body = vec![0u8; header.body_len as usize];
    reader.read_exact(&mut body).await?;
    Ok((header, Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CodecKind, MsgType};
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut client, mut server) = duplex(4096);

        let header = Header::new(CodecKind::Json, MsgType::Request, 42, 5);
        write_frame(&mut client, &header, b"hello").await.unwrap();

        let (decoded, body) = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn empty_body_roundtrip() {
        let (mut client, mut server) = duplex(64);

        let header = Header::heartbeat(CodecKind::Binary);
        write_frame(&mut client, &header, b"").await.unwrap();

        let (decoded, body) = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded.msg_type, MsgType::Heartbeat);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn one_mebibyte_body_roundtrip() {
        let (mut client, mut server) = duplex(64 * 1024);

        let payload = vec![0xAB; 1024 * 1024];
        let header = Header::new(CodecKind::Binary, MsgType::Request, 7, payload.len() as u32);

        let writer = tokio::spawn(async move {
            write_frame(&mut client, &header, &payload).await.unwrap();
        });

        let (decoded, body) = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();

        assert_eq!(decoded.body_len, 1024 * 1024);
        assert_eq!(body.len(), 1024 * 1024);
        assert!(body.iter().all(|&b| b == 0xAB));
    }

    #[tokio::test]
    async fn rejects_garbage_magic() {
        let (mut client, mut server) = duplex(64);

        tokio::io::AsyncWriteExt::write_all(&mut client, &[0u8; HEADER_SIZE])
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[tokio::test]
    async fn rejects_oversized_body() {
        let (mut client, mut server) = duplex(64);

        let mut head = Header::new(CodecKind::Json, MsgType::Request, 1, 0).encode();
        head[10..14].copy_from_slice(&(MAX_BODY_LEN + 1).to_be_bytes());
        tokio::io::AsyncWriteExt::write_all(&mut client, &head)
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn multiple_frames_in_sequence() {
        let (mut client, mut server) = duplex(4096);

        for seq in 1u32..=5 {
            let body = format!("message_{seq}");
            let header = Header::new(CodecKind::Json, MsgType::Request, seq, body.len() as u32);
            write_frame(&mut client, &header, body.as_bytes())
                .await
                .unwrap();
        }

        for seq in 1u32..=5 {
            let (header, body) = read_frame(&mut server).await.unwrap();
            assert_eq!(header.seq, seq);
            assert_eq!(&body[..], format!("message_{seq}").as_bytes());
        }
    }
}

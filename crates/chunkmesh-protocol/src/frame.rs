//! Frame format for wire transmission
//!
//! Frame Structure:
//! - Length (4 bytes): size of the envelope in bytes (big-endian, unsigned)
//! - Envelope (variable): JSON `{"type": <int>, "payload": <bytes>}`
//!
//! A frame is always written with a single `write_all` of one contiguous
//! buffer, so concurrent writers holding the connection's write lock can
//! never interleave partial frames.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FrameError, ProtocolError, Result};
use crate::message::Message;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest envelope accepted from a peer (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize a message into one length-prefixed frame
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let envelope = message.encode()?;

    if envelope.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: envelope.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut bytes = Vec::with_capacity(LENGTH_PREFIX_SIZE + envelope.len());
    bytes.extend_from_slice(&(envelope.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&envelope);
    Ok(bytes)
}

/// Read one frame and return the raw envelope bytes
///
/// Decoding is left to the caller so that a bad envelope can be dropped
/// without tearing down the stream.
pub async fn read_frame<R>(reader: &mut R) -> std::result::Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(FrameError::from_read)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut envelope = vec![0u8; len];
    reader
        .read_exact(&mut envelope)
        .await
        .map_err(FrameError::from_read)?;

    Ok(envelope)
}

/// Write one message as a single frame
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> std::result::Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(message)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[test]
    fn test_frame_layout() {
        let msg = Message::new(MessageType::Ping, vec![]);
        let frame = encode_frame(&msg).unwrap();
        let envelope = msg.encode().unwrap();

        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + envelope.len());
        assert_eq!(
            u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize,
            envelope.len()
        );
        assert_eq!(&frame[LENGTH_PREFIX_SIZE..], envelope.as_slice());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let first = Message::new(MessageType::NodeDiscovery, vec![]);
        let second = Message::announcement(&["127.0.0.1:9000".to_string()]).unwrap();

        write_frame(&mut client, &first).await.unwrap();
        write_frame(&mut client, &second).await.unwrap();

        let got = Message::decode(&read_frame(&mut server).await.unwrap()).unwrap();
        assert_eq!(got, first);
        let got = Message::decode(&read_frame(&mut server).await.unwrap()).unwrap();
        assert_eq!(got, second);
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_short_payload_is_connection_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);

        // Announce 10 bytes, deliver 3, then hang up
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_garbage_envelope_keeps_stream_aligned() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let garbage = b"{{{{";
        client
            .write_all(&(garbage.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(garbage).await.unwrap();
        write_frame(&mut client, &Message::empty(MessageType::Pong))
            .await
            .unwrap();

        let bad = read_frame(&mut server).await.unwrap();
        assert!(Message::decode(&bad).is_err());

        let good = Message::decode(&read_frame(&mut server).await.unwrap()).unwrap();
        assert_eq!(good.message_type, MessageType::Pong);
    }
}

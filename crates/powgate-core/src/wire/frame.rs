use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::limits::MAX_PAYLOAD_BYTES;
use crate::wire::message::{Message, MessageKind, WireError};

/// Writes one framed message: `[1: type][4: length, big-endian][payload]`.
///
/// Writes are bounded by the same payload limit the reader enforces.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.encode_payload();
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(WireError::OversizedPayload {
            declared: payload.len() as u32,
        });
    }
    writer.write_all(&[message.kind().tag()]).await?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed message.
///
/// The type tag is validated before the length, and the declared length is
/// checked against the payload limit before any buffer is allocated.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag).await?;
    let kind = MessageKind::from_tag(tag[0]).ok_or(WireError::UnknownKind(tag[0]))?;

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let declared = u32::from_be_bytes(len_buf);
    if declared as usize > MAX_PAYLOAD_BYTES {
        return Err(WireError::OversizedPayload { declared });
    }

    let mut payload = vec![0u8; declared as usize];
    reader.read_exact(&mut payload).await?;
    Message::decode(kind, &payload)
}

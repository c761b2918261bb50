//! APDU framing
//!
//! Commands travel as `u32 BE length || APDU`. Replies travel as
//! `u32 BE data length || data || SW1 SW2`, so a reply frame carries two more
//! bytes than its header announces.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::common::{Error, Result};

/// Maximum APDU frame size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Length of the status word that trails every reply
const STATUS_WORD_LEN: usize = 2;

/// Read one command frame
///
/// Returns `None` when the peer closed the connection between frames.
pub async fn read_command<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(data))
}

/// Write one command frame
pub async fn write_command<W: AsyncWriteExt + Unpin>(writer: &mut W, apdu: &[u8]) -> Result<()> {
    if apdu.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(apdu.len()));
    }
    writer.write_all(&(apdu.len() as u32).to_be_bytes()).await?;
    writer.write_all(apdu).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one reply frame, returned verbatim including its header
pub async fn read_reply<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }

    let mut frame = Vec::with_capacity(4 + len + STATUS_WORD_LEN);
    frame.extend_from_slice(&len_buf);
    frame.resize(4 + len + STATUS_WORD_LEN, 0);
    reader.read_exact(&mut frame[4..]).await?;
    Ok(frame)
}

/// Write one reply frame from its data and status word
pub async fn write_reply<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
    status: u16,
) -> Result<()> {
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.write_all(&status.to_be_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Split a raw reply frame into data and status word
pub fn parse_reply(frame: &[u8]) -> Option<(&[u8], u16)> {
    let len = u32::from_be_bytes(frame.get(..4)?.try_into().ok()?) as usize;
    let data = frame.get(4..4 + len)?;
    let sw = frame.get(4 + len..4 + len + STATUS_WORD_LEN)?;
    Some((data, u16::from_be_bytes([sw[0], sw[1]])))
}

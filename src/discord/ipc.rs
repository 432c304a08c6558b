//! Discord IPC framing: little-endian opcode and length, then a JSON body

use std::io;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::presence::TransportError;

const HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = IpcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Frame),
            2 => Ok(Self::Close),
            3 => Ok(Self::Ping),
            4 => Ok(Self::Pong),
            other => Err(IpcError::UnknownOpcode(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed IPC payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown IPC opcode {0}")]
    UnknownOpcode(u32),

    #[error("IPC frame of {0} bytes exceeds the limit")]
    FrameTooLarge(u32),
}

impl From<IpcError> for TransportError {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::Io(io_err) => match io_err.kind() {
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected => TransportError::Closed,
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    TransportError::NotFound
                }
                io::ErrorKind::TimedOut => TransportError::Timeout,
                _ => TransportError::Other(io_err.to_string()),
            },
            other => TransportError::Other(other.to_string()),
        }
    }
}

pub fn encode_frame(opcode: Opcode, body: &Value) -> Result<Vec<u8>, IpcError> {
    let payload = serde_json::to_vec(body)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(IpcError::FrameTooLarge(u32::MAX))?;

    let mut frame = Vec::with_capacity(HEADER_LEN.saturating_add(payload.len()));
    frame.extend_from_slice(&(opcode as u32).to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub async fn write_frame<W>(writer: &mut W, opcode: Opcode, body: &Value) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(opcode, body)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<(Opcode, Value), IpcError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let [o0, o1, o2, o3, l0, l1, l2, l3] = header;
    let opcode = Opcode::try_from(u32::from_le_bytes([o0, o1, o2, o3]))?;
    let len = u32::from_le_bytes([l0, l1, l2, l3]);
    if len > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((opcode, value))
}

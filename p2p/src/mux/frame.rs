use hyphae_net::Connection;

use crate::{Error, Result};

/// Maximum payload size carried by a single Data frame. Larger writes are
/// chunked by the stream layer.
pub const MAX_FRAME_DATA: usize = 16 * 1024;

/// Size of the fixed frame header: stream id, flag, payload length.
const HEADER_LEN: usize = 4 + 1 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    Open,
    Data,
    Close,
    Reset,
}

impl FrameType {
    fn to_u8(self) -> u8 {
        match self {
            FrameType::Open => 0,
            FrameType::Data => 1,
            FrameType::Close => 2,
            FrameType::Reset => 3,
        }
    }

    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(FrameType::Open),
            1 => Ok(FrameType::Data),
            2 => Ok(FrameType::Close),
            3 => Ok(FrameType::Reset),
            _ => Err(Error::InvalidMsg(format!("unknown frame flag: {b}"))),
        }
    }
}

/// A single multiplexer frame.
///
/// Wire format: `stream_id: u32 BE | flag: u8 | len: u32 BE | payload`.
/// Only Data frames carry a payload.
pub struct Frame {
    pub stream_id: u32,
    pub frame_type: FrameType,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn open(stream_id: u32) -> Self {
        Self {
            stream_id,
            frame_type: FrameType::Open,
            data: vec![],
        }
    }

    pub fn data(stream_id: u32, data: Vec<u8>) -> Self {
        Self {
            stream_id,
            frame_type: FrameType::Data,
            data,
        }
    }

    pub fn close(stream_id: u32) -> Self {
        Self {
            stream_id,
            frame_type: FrameType::Close,
            data: vec![],
        }
    }

    pub fn reset(stream_id: u32) -> Self {
        Self {
            stream_id,
            frame_type: FrameType::Reset,
            data: vec![],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.stream_id.to_be_bytes());
        buf.push(self.frame_type.to_u8());
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// Reads one frame from the connection, validating the flag and payload
/// length before allocating.
pub async fn read_frame<C: Connection + ?Sized>(conn: &C) -> Result<Frame> {
    let mut header = [0u8; HEADER_LEN];
    conn.read_exact(&mut header).await?;

    let stream_id = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let frame_type = FrameType::from_u8(header[4])?;
    let len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;

    if len > MAX_FRAME_DATA {
        return Err(Error::InvalidMsg(format!("frame payload too large: {len}")));
    }
    if len > 0 && frame_type != FrameType::Data {
        return Err(Error::InvalidMsg(
            "unexpected payload on a control frame".to_string(),
        ));
    }

    let mut data = vec![0u8; len];
    if len > 0 {
        conn.read_exact(&mut data).await?;
    }

    Ok(Frame {
        stream_id,
        frame_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use hyphae_net::transports::memory;

    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        smol::block_on(async {
            let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());

            let frame = Frame::data(3, b"hello".to_vec());
            a.write_all(&frame.encode()).await.unwrap();

            let got = read_frame(&b).await.unwrap();
            assert_eq!(got.stream_id, 3);
            assert_eq!(got.frame_type, FrameType::Data);
            assert_eq!(got.data, b"hello");
        });
    }

    #[test]
    fn test_frame_rejects_oversize() {
        smol::block_on(async {
            let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());

            let mut header = vec![];
            header.extend_from_slice(&1u32.to_be_bytes());
            header.push(1);
            header.extend_from_slice(&((MAX_FRAME_DATA + 1) as u32).to_be_bytes());
            a.write_all(&header).await.unwrap();

            assert!(matches!(
                read_frame(&b).await,
                Err(Error::InvalidMsg(_))
            ));
        });
    }

    #[test]
    fn test_frame_rejects_unknown_flag() {
        smol::block_on(async {
            let (a, b) = memory::pipe("mem://1".parse().unwrap(), "mem://2".parse().unwrap());

            let mut header = vec![];
            header.extend_from_slice(&1u32.to_be_bytes());
            header.push(9);
            header.extend_from_slice(&0u32.to_be_bytes());
            a.write_all(&header).await.unwrap();

            assert!(matches!(
                read_frame(&b).await,
                Err(Error::InvalidMsg(_))
            ));
        });
    }
}

// packet.rs - Wire format of the compressed packets carried by the socket
//
// version 1.0, all integers big endian
//
// data
// | ver_major | ver_minor | type | pkg_size | pkg_data |
// | 1         | 1         | 1    | 4        | -        |
//
// pkg_data
// | pts | dts | size | data | stream_index | flags | side_data_elems | side_data... | duration | pos |
// | 8   | 8   | 4    | -    | 4            | 4     | 4               | -            | 8        | 8   |
//
// side_data
// | type | size | data |
// | 1    | 4    | -    |
use bytes::{Buf, BufMut, Bytes};

use crate::error::PacketError;
use crate::types::MediaType;

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 7;
pub const FLAG_KEY: i32 = 0x0001;

const FIXED_BODY_SIZE: usize = 8 * 4 + 4 * 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SideData {
    pub kind: u8,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub media_type: MediaType,
    pub pts: i64,
    pub dts: i64,
    pub data: Bytes,
    pub stream_index: i32,
    pub flags: i32,
    pub side_data: Vec<SideData>,
    pub duration: i64,
    pub pos: i64,
}

impl Packet {
    pub fn video(pts: i64, data: impl Into<Bytes>, key: bool) -> Self {
        Self {
            media_type: MediaType::Video,
            pts,
            dts: pts,
            data: data.into(),
            stream_index: 0,
            flags: if key { FLAG_KEY } else { 0 },
            side_data: Vec::new(),
            duration: 0,
            pos: -1,
        }
    }

    pub fn is_key(&self) -> bool {
        self.flags & FLAG_KEY != 0
    }

    pub fn byte_size(&self) -> usize {
        HEADER_SIZE
            + FIXED_BODY_SIZE
            + self.data.len()
            + self
                .side_data
                .iter()
                .map(|side| 5 + side.data.len())
                .sum::<usize>()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut buf = bytes;
        need(buf, HEADER_SIZE)?;
        let _ver_major = buf.get_u8();
        let _ver_minor = buf.get_u8();
        let media_type = MediaType::from_code(buf.get_u8());
        let pkg_size = buf.get_u32() as usize;
        if bytes.len() < pkg_size {
            return Err(PacketError::NotEnough {
                needed: pkg_size,
                available: bytes.len(),
            });
        }

        need(buf, 20)?;
        let pts = buf.get_i64();
        let dts = buf.get_i64();
        let size = length(buf.get_i32())?;
        need(buf, size)?;
        let data = Bytes::copy_from_slice(&buf[..size]);
        buf.advance(size);

        need(buf, 12)?;
        let stream_index = buf.get_i32();
        let flags = buf.get_i32();
        let side_data_elems = length(buf.get_i32())?;
        let mut side_data = Vec::with_capacity(side_data_elems.min(16));
        for _ in 0..side_data_elems {
            need(buf, 5)?;
            let kind = buf.get_u8();
            let size = length(buf.get_i32())?;
            need(buf, size)?;
            side_data.push(SideData {
                kind,
                data: Bytes::copy_from_slice(&buf[..size]),
            });
            buf.advance(size);
        }

        need(buf, 16)?;
        let duration = buf.get_i64();
        let pos = buf.get_i64();

        let parsed = bytes.len() - buf.remaining();
        if parsed != pkg_size {
            return Err(PacketError::SizeMismatch {
                declared: pkg_size,
                parsed,
            });
        }

        Ok(Self {
            media_type,
            pts,
            dts,
            data,
            stream_index,
            flags,
            side_data,
            duration,
            pos,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = self.byte_size();
        let mut out = Vec::with_capacity(size);
        out.put_u8(VERSION_MAJOR);
        out.put_u8(VERSION_MINOR);
        out.put_u8(self.media_type.code());
        out.put_u32(size as u32);
        out.put_i64(self.pts);
        out.put_i64(self.dts);
        out.put_i32(self.data.len() as i32);
        out.put_slice(&self.data);
        out.put_i32(self.stream_index);
        out.put_i32(self.flags);
        out.put_i32(self.side_data.len() as i32);
        for side in &self.side_data {
            out.put_u8(side.kind);
            out.put_i32(side.data.len() as i32);
            out.put_slice(&side.data);
        }
        out.put_i64(self.duration);
        out.put_i64(self.pos);
        out
    }
}

fn need(buf: &[u8], n: usize) -> Result<(), PacketError> {
    if buf.remaining() < n {
        Err(PacketError::NotEnough {
            needed: n,
            available: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

fn length(raw: i32) -> Result<usize, PacketError> {
    usize::try_from(raw).map_err(|_| PacketError::NegativeLength(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_packet_parses_back_with_side_data() {
        let mut packet = Packet::video(40, vec![1u8, 2, 3, 4], true);
        packet.side_data.push(SideData {
            kind: 7,
            data: Bytes::from_static(&[9, 9]),
        });
        packet.duration = 40;

        let bytes = packet.encode();
        assert_eq!(bytes.len(), packet.byte_size());
        assert_eq!(&bytes[..3], &[1, 0, 0]);

        let parsed = Packet::decode(&bytes).unwrap();
        assert_eq!(parsed, packet);
        assert!(parsed.is_key());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = Packet::video(0, vec![0u8; 32], false).encode();
        let err = Packet::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, PacketError::NotEnough { .. }));

        let err = Packet::decode(&bytes[..3]).unwrap_err();
        assert_eq!(
            err,
            PacketError::NotEnough {
                needed: HEADER_SIZE,
                available: 3
            }
        );
    }

    #[test]
    fn negative_payload_size_is_rejected() {
        let mut bytes = Packet::video(0, Vec::<u8>::new(), false).encode();
        // size field sits after header + pts + dts
        bytes[HEADER_SIZE + 16..HEADER_SIZE + 20].copy_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            Packet::decode(&bytes).unwrap_err(),
            PacketError::NegativeLength(-1)
        );
    }

    #[test]
    fn declared_size_must_match_parsed_size() {
        let mut bytes = Packet::video(0, vec![5u8; 4], false).encode();
        bytes.extend_from_slice(&[0, 0]);
        let declared = bytes.len() as u32;
        bytes[3..7].copy_from_slice(&declared.to_be_bytes());
        assert!(matches!(
            Packet::decode(&bytes).unwrap_err(),
            PacketError::SizeMismatch { .. }
        ));
    }
}

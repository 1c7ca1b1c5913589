//! Datagram <-> MAVLink frame conversion.
//!
//! One UDP datagram may carry several frames, v1 and v2 mixed. Each frame is
//! cut out by its header length and decoded on its own, so a bad CRC or an
//! undecodable payload costs exactly that frame. Bytes between frames count
//! as one error per run. Messages outside the `common` dialect are skipped.

use std::io::Cursor;

use mavlink::common::MavMessage;
use mavlink::error::{MessageReadError, ParserError};
use mavlink::{MavHeader, MavlinkVersion, Message};

use crate::LinkError;

pub const MAGIC_V1: u8 = 0xFE;
pub const MAGIC_V2: u8 = 0xFD;

/// Upper bound for a single MAVLink v2 frame (signed, full payload).
pub const MAX_FRAME_LEN: usize = 280;

// header + checksum around the payload
const V1_OVERHEAD: usize = 8;
const V2_OVERHEAD: usize = 12;
const V2_SIGNATURE_LEN: usize = 13;
const V2_FLAG_SIGNED: u8 = 0x01;

#[derive(Debug, Default)]
pub struct Decoded {
    pub frames: Vec<(MavHeader, MavMessage)>,
    /// Frames we could not decode (bad CRC, truncated, invalid enum value)
    /// plus runs of bytes that are not frames at all.
    pub errors: usize,
    /// Well-formed frames of message ids we do not know.
    pub unknown: usize,
}

enum FrameStart {
    NotMagic,
    Truncated,
    Frame { len: usize, version: MavlinkVersion, msgid: u32 },
}

fn frame_start(buf: &[u8]) -> FrameStart {
    let (len, version, msgid) = match (buf.first(), buf.get(1), buf.get(2)) {
        (Some(&MAGIC_V2), Some(&payload), Some(&incompat)) => {
            let sig = if incompat & V2_FLAG_SIGNED != 0 { V2_SIGNATURE_LEN } else { 0 };
            let id = match buf.get(7..10) {
                Some(b) => u32::from_le_bytes([b[0], b[1], b[2], 0]),
                None => return FrameStart::Truncated,
            };
            (V2_OVERHEAD + payload as usize + sig, MavlinkVersion::V2, id)
        }
        (Some(&MAGIC_V1), Some(&payload), _) => match buf.get(5) {
            Some(&id) => (V1_OVERHEAD + payload as usize, MavlinkVersion::V1, u32::from(id)),
            None => return FrameStart::Truncated,
        },
        (Some(&MAGIC_V1 | &MAGIC_V2), _, _) => return FrameStart::Truncated,
        _ => return FrameStart::NotMagic,
    };
    if len > buf.len() {
        return FrameStart::Truncated;
    }
    FrameStart::Frame { len, version, msgid }
}

pub fn decode_datagram(data: &[u8]) -> Decoded {
    let mut out = Decoded::default();
    let mut rest = data;
    while !rest.is_empty() {
        match frame_start(rest) {
            FrameStart::Frame { len, version, msgid } => {
                let (frame, tail) = rest.split_at(len);
                rest = tail;
                // the reader checks an unknown id against CRC extra 0 and
                // would report it as corrupt
                if MavMessage::default_message_from_id(msgid).is_err() {
                    out.unknown += 1;
                    continue;
                }
                match mavlink::read_versioned_msg::<MavMessage, _>(&mut Cursor::new(frame), version) {
                    Ok(f) => out.frames.push(f),
                    Err(MessageReadError::Parse(ParserError::UnknownMessage { .. })) => out.unknown += 1,
                    // a bad CRC makes the reader hunt past the frame end
                    Err(_) => out.errors += 1,
                }
            }
            FrameStart::Truncated => {
                out.errors += 1;
                break;
            }
            FrameStart::NotMagic => {
                out.errors += 1;
                let skip = rest[1..]
                    .iter()
                    .position(|&b| b == MAGIC_V1 || b == MAGIC_V2)
                    .map_or(rest.len(), |i| i + 1);
                rest = &rest[skip..];
            }
        }
    }
    out
}

pub fn encode(header: MavHeader, msg: &MavMessage) -> Result<Vec<u8>, LinkError> {
    let mut buf = Vec::with_capacity(MAX_FRAME_LEN);
    mavlink::write_v2_msg(&mut buf, header, msg).map_err(|e| LinkError::Encode(format!("{e:?}")))?;
    Ok(buf)
}

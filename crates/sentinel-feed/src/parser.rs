//! Binary market-feed packet decoding.
//!
//! Every packet starts with an 8-byte little-endian header:
//!
//! ```text
//! 0      1        3        4            8
//! +------+--------+--------+------------+
//! | code | length | seg    | securityId |
//! | u8   | u16    | u8     | u32        |
//! +------+--------+--------+------------+
//! ```
//!
//! Ticker packets (code 2) carry `f32` LTP and `u32` last-trade time.
//! Disconnect packets (code 50) carry an `u16` reason code. A WebSocket
//! frame may hold several packets back to back.

use sentinel_core::{InstrumentRef, Price, SecurityId, Segment};

use crate::error::{FeedError, FeedResult};

pub const HEADER_LEN: usize = 8;
pub const CODE_TICKER: u8 = 2;
pub const CODE_DISCONNECT: u8 = 50;

const TICKER_LEN: usize = HEADER_LEN + 8;
const DISCONNECT_LEN: usize = HEADER_LEN + 2;

/// Decoded feed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPacket {
    Ticker {
        instrument: InstrumentRef,
        ltp: Price,
        /// Last trade time, epoch seconds.
        ltt: u32,
    },
    Disconnect {
        reason: u16,
    },
    /// Packet types the monitor does not consume (quote, OI, prev close...).
    Ignored {
        code: u8,
    },
}

struct Header {
    code: u8,
    length: u16,
    segment: u8,
    security_id: u32,
}

fn read_header(buf: &[u8]) -> FeedResult<Header> {
    if buf.len() < HEADER_LEN {
        return Err(FeedError::Packet(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            buf.len()
        )));
    }
    Ok(Header {
        code: buf[0],
        length: u16::from_le_bytes([buf[1], buf[2]]),
        segment: buf[3],
        security_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    })
}

/// Result of decoding one WebSocket frame.
#[derive(Debug, Default)]
pub struct ParsedFrame {
    /// Packets that decoded cleanly, in frame order.
    pub packets: Vec<FeedPacket>,
    /// Packets that were skipped, and a truncated tail if any.
    pub errors: Vec<FeedError>,
}

/// Decode every packet in a binary frame.
///
/// A bad ticker (unknown segment, non-finite LTP) is skipped by its fixed
/// length and decoding carries on. A truncated packet ends the frame; the
/// packets before it are still returned.
pub fn parse_frame(data: &[u8]) -> ParsedFrame {
    let mut frame = ParsedFrame::default();
    let mut offset = 0;

    while offset < data.len() {
        let rest = &data[offset..];
        let header = match read_header(rest) {
            Ok(header) => header,
            Err(e) => {
                frame.errors.push(e);
                break;
            }
        };

        let consumed = match header.code {
            CODE_TICKER => {
                if rest.len() < TICKER_LEN {
                    frame.errors.push(FeedError::Packet(format!(
                        "ticker packet needs {TICKER_LEN} bytes, got {}",
                        rest.len()
                    )));
                    break;
                }
                match parse_ticker(&header, rest) {
                    Ok(packet) => frame.packets.push(packet),
                    Err(e) => frame.errors.push(e),
                }
                TICKER_LEN
            }
            CODE_DISCONNECT => {
                if rest.len() < DISCONNECT_LEN {
                    frame
                        .errors
                        .push(FeedError::Packet("truncated disconnect packet".to_string()));
                    break;
                }
                let reason = u16::from_le_bytes([rest[8], rest[9]]);
                frame.packets.push(FeedPacket::Disconnect { reason });
                DISCONNECT_LEN
            }
            code => {
                frame.packets.push(FeedPacket::Ignored { code });
                let declared = header.length as usize;
                if declared >= HEADER_LEN && declared <= rest.len() {
                    declared
                } else {
                    rest.len()
                }
            }
        };

        offset += consumed;
    }

    frame
}

/// `buf` holds at least [`TICKER_LEN`] bytes.
fn parse_ticker(header: &Header, buf: &[u8]) -> FeedResult<FeedPacket> {
    let segment = Segment::from_code(header.segment)
        .ok_or_else(|| FeedError::Packet(format!("unknown segment code {}", header.segment)))?;
    let raw_ltp = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let ltp = Price::from_wire_f32(raw_ltp)
        .ok_or_else(|| FeedError::Packet(format!("non-finite LTP {raw_ltp}")))?;
    let ltt = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);

    Ok(FeedPacket::Ticker {
        instrument: InstrumentRef::new(SecurityId::new(header.security_id), segment),
        ltp,
        ltt,
    })
}

//! The five-byte TN3270E record header

use super::codes::*;
use crate::error::{Tn3270eError, Tn3270eResult};
use crate::telnet::codes::{escape_iac_into, TelnetCommand, IAC};

/// Per-record header: data type, request flag, response flag and a 16-bit
/// big-endian sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tn3270eHeader {
    pub data_type: u8,
    pub request_flag: u8,
    pub response_flag: u8,
    pub seq_number: u16,
}

impl Tn3270eHeader {
    pub fn new(data_type: u8, seq_number: u16) -> Self {
        Self {
            data_type,
            request_flag: 0,
            response_flag: RSF_NO_RESPONSE,
            seq_number,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [hi, lo] = self.seq_number.to_be_bytes();
        [self.data_type, self.request_flag, self.response_flag, hi, lo]
    }

    /// Parse the header at the front of an already de-escaped record.
    pub fn parse(record: &[u8]) -> Tn3270eResult<Self> {
        if record.len() < HEADER_LEN {
            return Err(Tn3270eError::ShortRecord { length: record.len() });
        }
        Ok(Self {
            data_type: record[0],
            request_flag: record[1],
            response_flag: record[2],
            seq_number: u16::from_be_bytes([record[3], record[4]]),
        })
    }

    /// Append the header to `out` with every IAC byte doubled.
    pub fn encode_escaped(&self, out: &mut Vec<u8>) {
        escape_iac_into(out, &self.to_bytes());
    }

    /// Decode a header from wire bytes that may contain doubled IACs.
    /// Returns the header and the number of wire bytes consumed.
    pub fn decode_escaped(wire: &[u8]) -> Tn3270eResult<(Self, usize)> {
        let mut raw = [0u8; HEADER_LEN];
        let mut filled = 0;
        let mut pos = 0;
        while filled < HEADER_LEN {
            let byte = *wire
                .get(pos)
                .ok_or(Tn3270eError::TruncatedHeader { received: filled })?;
            if byte == IAC {
                if wire.get(pos + 1) != Some(&IAC) {
                    return Err(Tn3270eError::TruncatedHeader { received: filled });
                }
                pos += 2;
            } else {
                pos += 1;
            }
            raw[filled] = byte;
            filled += 1;
        }
        Ok((Self::parse(&raw)?, pos))
    }

    pub fn describe(&self) -> String {
        format!(
            "{} REQ=0x{:02x} RSP=0x{:02x} SEQ={}",
            data_type_name(self.data_type),
            self.request_flag,
            self.response_flag,
            self.seq_number
        )
    }
}

/// Build a complete outbound record: escaped header, escaped payload, `IAC EOR`.
pub fn frame_record(header: &Tn3270eHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    header.encode_escaped(&mut out);
    escape_iac_into(&mut out, payload);
    out.push(IAC);
    out.push(TelnetCommand::EOR as u8);
    out
}

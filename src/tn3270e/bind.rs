//! BIND image decoding
//!
//! The host sends the SNA BIND request unit inside a BIND-IMAGE record. We keep
//! the raw bytes and pull out the handful of fields the emulator cares about:
//! maximum RU sizes, the default and alternate screen sizes, and the LU names.

use crate::ebcdic::decode_sna_name;

/// BIND request code
pub const BIND_RU: u8 = 0x31;

pub const BIND_OFF_MAXRU_SEC: usize = 10;
pub const BIND_OFF_MAXRU_PRI: usize = 11;
pub const BIND_OFF_RD: usize = 20;
pub const BIND_OFF_CD: usize = 21;
pub const BIND_OFF_RA: usize = 22;
pub const BIND_OFF_CA: usize = 23;
pub const BIND_OFF_SSIZE: usize = 24;
pub const BIND_OFF_PLU_NAME_LEN: usize = 26;
pub const BIND_OFF_PLU_NAME: usize = 27;
pub const BIND_PLU_NAME_MAX: usize = 8;
pub const BIND_SLU_NAME_MAX: usize = 17;

/// Screen size used when the BIND says nothing or says something invalid
pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;

/// Decoded BIND image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindImage {
    raw: Vec<u8>,
    pub plu_name: Option<String>,
    pub slu_name: Option<String>,
    /// Maximum RU size, secondary to primary; 0 means unspecified
    pub max_ru_sec: u32,
    /// Maximum RU size, primary to secondary; 0 means unspecified
    pub max_ru_pri: u32,
    pub default_rows: u16,
    pub default_cols: u16,
    pub alternate_rows: u16,
    pub alternate_cols: u16,
    /// False if the image asked for sizes outside the model's bounds; the sizes
    /// above then hold the fallback defaults.
    pub sizes_valid: bool,
}

/// Decode an RU size byte: high bit set means mantissa (high nibble) times
/// two to the exponent (low nibble).
fn decode_ru_size(byte: u8) -> u32 {
    if byte & 0x80 == 0 {
        return 0;
    }
    let mantissa = u32::from((byte >> 4) & 0x0f);
    let exponent = u32::from(byte & 0x0f);
    mantissa << exponent
}

impl BindImage {
    /// Decode a BIND image. Returns `None` if the buffer is not a BIND RU.
    /// `max_rows`/`max_cols` are the bounds of the configured terminal model.
    pub fn decode(raw: &[u8], max_rows: u16, max_cols: u16) -> Option<Self> {
        if raw.first() != Some(&BIND_RU) {
            return None;
        }

        let mut image = BindImage {
            raw: raw.to_vec(),
            plu_name: None,
            slu_name: None,
            max_ru_sec: raw.get(BIND_OFF_MAXRU_SEC).map_or(0, |&b| decode_ru_size(b)),
            max_ru_pri: raw.get(BIND_OFF_MAXRU_PRI).map_or(0, |&b| decode_ru_size(b)),
            default_rows: DEFAULT_ROWS,
            default_cols: DEFAULT_COLS,
            alternate_rows: max_rows,
            alternate_cols: max_cols,
            sizes_valid: true,
        };

        if let Some(&ssize) = raw.get(BIND_OFF_SSIZE) {
            let field = |off: usize| u16::from(raw.get(off).copied().unwrap_or(0));
            let sizes = match ssize {
                0x00 | 0x02 => Some((DEFAULT_ROWS, DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_COLS)),
                0x03 => Some((DEFAULT_ROWS, DEFAULT_COLS, max_rows, max_cols)),
                0x7e => {
                    let (rd, cd) = (field(BIND_OFF_RD), field(BIND_OFF_CD));
                    Some((rd, cd, rd, cd))
                }
                0x7f => Some((
                    field(BIND_OFF_RD),
                    field(BIND_OFF_CD),
                    field(BIND_OFF_RA),
                    field(BIND_OFF_CA),
                )),
                _ => None,
            };

            match sizes {
                Some((rd, cd, ra, ca))
                    if rd > 0
                        && cd > 0
                        && ra > 0
                        && ca > 0
                        && rd <= max_rows
                        && cd <= max_cols
                        && ra <= max_rows
                        && ca <= max_cols =>
                {
                    image.default_rows = rd;
                    image.default_cols = cd;
                    image.alternate_rows = ra;
                    image.alternate_cols = ca;
                }
                _ => {
                    log::warn!(
                        "BIND screen size 0x{ssize:02x} does not fit a {max_rows}x{max_cols} model, using defaults"
                    );
                    image.sizes_valid = false;
                }
            }
        }

        // PLU name, then user data, correlation field and SLU name
        if let Some(&len) = raw.get(BIND_OFF_PLU_NAME_LEN) {
            let len = usize::from(len);
            let plu_len = len.min(BIND_PLU_NAME_MAX);
            if plu_len > 0 && raw.len() >= BIND_OFF_PLU_NAME + plu_len {
                image.plu_name =
                    Some(decode_sna_name(&raw[BIND_OFF_PLU_NAME..BIND_OFF_PLU_NAME + plu_len]));
            }

            let mut offset = BIND_OFF_PLU_NAME + len;
            // user data structure, then user request correlation field
            for _ in 0..2 {
                match raw.get(offset) {
                    Some(&skip) => offset += 1 + usize::from(skip),
                    None => return Some(image),
                }
            }
            if let Some(&slu_len) = raw.get(offset) {
                let slu_len = usize::from(slu_len).min(BIND_SLU_NAME_MAX);
                if slu_len > 0 && raw.len() >= offset + 1 + slu_len {
                    image.slu_name = Some(decode_sna_name(&raw[offset + 1..offset + 1 + slu_len]));
                }
            }
        }

        Some(image)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 0x7F BIND asking for 32x80 default and 43x80 alternate, PLU "CICS".
    fn sample_bind(ssize: u8, rd: u8, cd: u8, ra: u8, ca: u8) -> Vec<u8> {
        let mut raw = vec![0u8; 27];
        raw[0] = BIND_RU;
        raw[BIND_OFF_MAXRU_SEC] = 0x87; // 8 * 2^7
        raw[BIND_OFF_MAXRU_PRI] = 0xf8; // 15 * 2^8
        raw[BIND_OFF_RD] = rd;
        raw[BIND_OFF_CD] = cd;
        raw[BIND_OFF_RA] = ra;
        raw[BIND_OFF_CA] = ca;
        raw[BIND_OFF_SSIZE] = ssize;
        raw[BIND_OFF_PLU_NAME_LEN] = 4;
        raw.extend_from_slice(&[0xC3, 0xC9, 0xC3, 0xE2]);
        raw
    }

    #[test]
    fn test_non_bind_is_rejected() {
        assert_eq!(BindImage::decode(&[0x32, 0, 0], 43, 80), None);
        assert_eq!(BindImage::decode(&[], 43, 80), None);
    }

    #[test]
    fn test_explicit_sizes() {
        let image = BindImage::decode(&sample_bind(0x7f, 32, 80, 43, 80), 43, 80).unwrap();
        assert!(image.sizes_valid);
        assert_eq!((image.default_rows, image.default_cols), (32, 80));
        assert_eq!((image.alternate_rows, image.alternate_cols), (43, 80));
        assert_eq!(image.max_ru_sec, 1024);
        assert_eq!(image.max_ru_pri, 3840);
        assert_eq!(image.plu_name.as_deref(), Some("CICS"));
        assert_eq!(image.slu_name, None);
    }

    #[test]
    fn test_oversize_falls_back_to_defaults() {
        let image = BindImage::decode(&sample_bind(0x7f, 24, 80, 27, 132), 24, 80).unwrap();
        assert!(!image.sizes_valid);
        assert_eq!((image.default_rows, image.default_cols), (24, 80));
        assert_eq!((image.alternate_rows, image.alternate_cols), (24, 80));
    }

    #[test]
    fn test_model_alternate() {
        let image = BindImage::decode(&sample_bind(0x03, 0, 0, 0, 0), 27, 132).unwrap();
        assert!(image.sizes_valid);
        assert_eq!((image.alternate_rows, image.alternate_cols), (27, 132));
    }

    #[test]
    fn test_same_default_and_alternate() {
        let image = BindImage::decode(&sample_bind(0x7e, 32, 80, 0, 0), 43, 80).unwrap();
        assert_eq!((image.alternate_rows, image.alternate_cols), (32, 80));
    }

    #[test]
    fn test_unknown_size_code_is_invalid() {
        let image = BindImage::decode(&sample_bind(0x55, 0, 0, 0, 0), 24, 80).unwrap();
        assert!(!image.sizes_valid);
    }

    #[test]
    fn test_slu_name_after_user_data() {
        let mut raw = sample_bind(0x02, 0, 0, 0, 0);
        raw.push(2); // user data length
        raw.extend_from_slice(&[0xaa, 0xbb]);
        raw.push(0); // correlation field length
        raw.push(4); // SLU name length
        raw.extend_from_slice(&[0xD3, 0xE4, 0xF0, 0xF1]);
        let image = BindImage::decode(&raw, 24, 80).unwrap();
        assert_eq!(image.slu_name.as_deref(), Some("LU01"));
    }
}

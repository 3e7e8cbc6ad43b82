//! Data-stream tracing
//!
//! Raw network traffic goes to the `log` facade at trace level as timestamped
//! hex dumps, one line per 16 bytes.

use std::fmt::Write as _;

/// Direction marker for a dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Direction::Sent => '>',
            Direction::Received => '<',
        }
    }
}

/// Format `data` as hex dump lines, each prefixed with the direction marker
/// and the offset.
pub fn format_dump(direction: Direction, data: &[u8]) -> Vec<String> {
    data.chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("{} 0x{:<4x}", direction.marker(), i * 16);
            for byte in chunk {
                let _ = write!(line, " {byte:02x}");
            }
            line
        })
        .collect()
}

/// Dump `data` at trace level, tagged with the connection id.
pub fn hex_dump(conn_id: &str, direction: Direction, data: &[u8]) {
    if !log::log_enabled!(log::Level::Trace) || data.is_empty() {
        return;
    }
    let stamp = chrono::Local::now().format("%H:%M:%S%.6f");
    log::trace!("[{conn_id}] {stamp} {} {} bytes", direction.marker(), data.len());
    for line in format_dump(direction, data) {
        log::trace!("[{conn_id}] {line}");
    }
}

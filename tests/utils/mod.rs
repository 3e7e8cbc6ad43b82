#![allow(dead_code)]

pub mod mock_network;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Address `192.0.2.<n>:23` from the documentation range
pub fn addr(n: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, n)), 23)
}

/// `IAC <command> <option>`
pub fn neg(command: u8, option: u8) -> Vec<u8> {
    vec![0xff, command, option]
}

/// `IAC SB <option> <body> IAC SE`, with IAC bytes in `body` doubled
pub fn sb(option: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xff, 0xfa, option];
    for &b in body {
        out.push(b);
        if b == 0xff {
            out.push(0xff);
        }
    }
    out.extend_from_slice(&[0xff, 0xf0]);
    out
}

/// True if `needle` occurs anywhere in `haystack`
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

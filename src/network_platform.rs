// Cross-platform socket option helpers for new host connections

#[cfg(unix)]
fn set_bool_option(
    socket: std::os::unix::io::RawFd,
    name: libc::c_int,
) -> Result<(), std::io::Error> {
    let optval: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket,
            libc::SOL_SOCKET,
            name,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of_val(&optval) as libc::socklen_t,
        )
    };
    if ret != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(unix)]
pub fn enable_tcp_keepalive(socket: std::os::unix::io::RawFd) -> Result<(), std::io::Error> {
    set_bool_option(socket, libc::SO_KEEPALIVE)
}

/// Urgent data (the TELNET Data Mark) arrives in the normal stream
#[cfg(unix)]
pub fn enable_oob_inline(socket: std::os::unix::io::RawFd) -> Result<(), std::io::Error> {
    set_bool_option(socket, libc::SO_OOBINLINE)
}

#[cfg(windows)]
fn set_bool_option(socket: u64, name: i32) -> Result<(), std::io::Error> {
    use winapi::shared::ws2def::SOL_SOCKET;
    use winapi::um::winsock2::{setsockopt, SOCKET, SOCKET_ERROR};
    let optval: i32 = 1;
    let ret = unsafe {
        setsockopt(
            socket as SOCKET,
            SOL_SOCKET,
            name,
            &optval as *const _ as *const i8,
            std::mem::size_of_val(&optval) as i32,
        )
    };
    if ret == SOCKET_ERROR {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(windows)]
pub fn enable_tcp_keepalive(socket: u64) -> Result<(), std::io::Error> {
    set_bool_option(socket, winapi::shared::ws2def::SO_KEEPALIVE)
}

#[cfg(windows)]
pub fn enable_oob_inline(socket: u64) -> Result<(), std::io::Error> {
    set_bool_option(socket, winapi::shared::ws2def::SO_OOBINLINE)
}

/// Apply the options every host socket gets. Failures are logged, not fatal.
#[cfg(unix)]
pub fn configure_host_socket<S: std::os::unix::io::AsRawFd>(socket: &S) {
    let fd = socket.as_raw_fd();
    if let Err(e) = enable_tcp_keepalive(fd) {
        log::warn!("Cannot enable TCP keepalive: {e}");
    }
    if let Err(e) = enable_oob_inline(fd) {
        log::warn!("Cannot enable OOB inline: {e}");
    }
}

#[cfg(windows)]
pub fn configure_host_socket<S: std::os::windows::io::AsRawSocket>(socket: &S) {
    let raw = socket.as_raw_socket();
    if let Err(e) = enable_tcp_keepalive(raw) {
        log::warn!("Cannot enable TCP keepalive: {e}");
    }
    if let Err(e) = enable_oob_inline(raw) {
        log::warn!("Cannot enable OOB inline: {e}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_options_on_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_raw_fd();
        assert!(enable_tcp_keepalive(fd).is_ok());
        assert!(enable_oob_inline(fd).is_ok());
    }

    #[test]
    fn test_invalid_descriptor_is_an_error() {
        assert!(enable_tcp_keepalive(-1).is_err());
    }
}

use super::poller::platform::{
    sys_accept, sys_bind, sys_close, sys_listen, sys_set_linger, sys_set_reuseaddr, sys_socket,
    sys_sockname,
};

use libc::AF_INET;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::RawFd;

/// Non-blocking listening socket.
///
/// Binds every IPv4 interface on the requested port. The descriptor is
/// closed on drop.
pub(crate) struct Listener {
    /// File descriptor of the listening socket.
    fd: RawFd,

    /// Address actually bound; resolves port `0` to the kernel's pick.
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds `0.0.0.0:port` and starts listening.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - applies `SO_LINGER` (one second) when `linger` is set,
    /// - enables `SO_REUSEADDR`,
    /// - binds and starts listening with the given backlog.
    pub(crate) fn bind(port: u16, backlog: i32, linger: bool) -> io::Result<Self> {
        let fd = sys_socket(AF_INET)?;

        let setup = || -> io::Result<SocketAddr> {
            if linger {
                sys_set_linger(fd, true)?;
            }
            sys_set_reuseaddr(fd)?;
            sys_bind(
                fd,
                &SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
            )?;
            sys_listen(fd, backlog)?;
            sys_sockname(fd)
        };

        match setup() {
            Ok(local_addr) => Ok(Self { fd, local_addr }),
            Err(e) => {
                sys_close(fd);
                Err(e)
            }
        }
    }

    /// Accepts one pending connection.
    ///
    /// The returned socket is already non-blocking. Reports
    /// `ErrorKind::WouldBlock` when nothing is pending.
    pub(crate) fn accept(&self) -> io::Result<(RawFd, SocketAddr)> {
        sys_accept(self.fd)
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the local socket address of this listener.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Listener {
    /// Closes the listening socket.
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpStream;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = Listener::bind(0, 16, false).unwrap();

        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.fd() >= 0);
    }

    #[test]
    fn test_accept_would_block_then_succeeds() {
        let listener = Listener::bind(0, 16, true).unwrap();
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        let port = listener.local_addr().port();
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();

        let mut accepted = None;
        for _ in 0..100 {
            match listener.accept() {
                Ok(pair) => {
                    accepted = Some(pair);
                    break;
                }
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(5)),
            }
        }

        let (fd, addr) = accepted.expect("connection was not accepted");
        assert!(addr.ip().is_loopback());
        sys_close(fd);
    }
}

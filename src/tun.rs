//! Raw `/dev/net/tun` device acquisition.
//!
//! Ported from `utils/tun/tun.go` and `utils/tun/syscall.go` in the original
//! implementation: open the clone device, issue `TUNSETIFF` to create (or
//! attach to) an interface in IFF_TUN|IFF_NO_PI mode, optionally
//! `TUNSETPERSIST`. Deliberately does not touch address, netmask, MTU, or
//! link state — per spec, assigning `--ip` to the resulting interface is the
//! caller's job, done out-of-band with the OS `ip` utility, not this crate's.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const TUN_DEV_PATH: &str = "/dev/net/tun";

const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;

// From linux/if_tun.h, not exposed by libc.
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const TUNSETPERSIST: libc::c_ulong = 0x4004_54cb;

#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    pad: [u8; 22],
}

/// A kernel TUN device, readable/writable as a stream of raw IPv4 datagrams.
pub struct Tun {
    inner: AsyncFd<OwnedFd>,
    name: String,
}

struct OwnedFd(RawFd);

impl AsRawFd for OwnedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for OwnedFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

impl Tun {
    /// Opens or creates interface `name`. If `persist` is set, the interface
    /// survives this process exiting (`TUNSETPERSIST`), mirroring
    /// `tun.Open(name, persist)`.
    pub fn open(name: &str, persist: bool) -> io::Result<Self> {
        let path = std::ffi::CString::new(TUN_DEV_PATH).expect("no interior nul");
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut req = name_to_ifreq(name)?;
        req.flags = IFF_TUN | IFF_NO_PI;

        let rc = unsafe { libc::ioctl(fd, TUNSETIFF as _, &mut req as *mut IfReq) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        if persist {
            let rc = unsafe { libc::ioctl(fd, TUNSETPERSIST as _, 1i32) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
        }

        set_nonblocking(fd)?;

        let actual_name = ifreq_name(&req);
        Ok(Tun {
            inner: AsyncFd::new(OwnedFd(fd))?,
            name: actual_name,
        })
    }

    /// The interface name the kernel actually assigned (may differ from the
    /// requested name, e.g. `tun%d` templates).
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn name_to_ifreq(name: &str) -> io::Result<IfReq> {
    if name.len() >= libc::IFNAMSIZ {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    let mut req = IfReq {
        name: [0; libc::IFNAMSIZ],
        flags: 0,
        pad: [0; 22],
    };
    for (dst, src) in req.name.iter_mut().zip(name.bytes()) {
        *dst = src as libc::c_char;
    }
    Ok(req)
}

fn ifreq_name(req: &IfReq) -> String {
    let bytes: Vec<u8> = req
        .name
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl AsyncRead for Tun {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        loop {
            let mut guard = match self.inner.poll_read_ready(cx) {
                std::task::Poll::Ready(Ok(guard)) => guard,
                std::task::Poll::Ready(Err(e)) => return std::task::Poll::Ready(Err(e)),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            };
            let fd = self.inner.get_ref().as_raw_fd();
            let unfilled = buf.initialize_unfilled();
            let n = unsafe {
                libc::read(fd, unfilled.as_mut_ptr() as *mut libc::c_void, unfilled.len())
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    guard.clear_ready();
                    continue;
                }
                return std::task::Poll::Ready(Err(err));
            }
            buf.advance(n as usize);
            return std::task::Poll::Ready(Ok(()));
        }
    }
}

impl AsyncWrite for Tun {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        data: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        loop {
            let mut guard = match self.inner.poll_write_ready(cx) {
                std::task::Poll::Ready(Ok(guard)) => guard,
                std::task::Poll::Ready(Err(e)) => return std::task::Poll::Ready(Err(e)),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            };
            let fd = self.inner.get_ref().as_raw_fd();
            let n = unsafe {
                libc::write(fd, data.as_ptr() as *const libc::c_void, data.len())
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    guard.clear_ready();
                    continue;
                }
                return std::task::Poll::Ready(Err(err));
            }
            return std::task::Poll::Ready(Ok(n as usize));
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifreq_round_trips_short_name() {
        let req = name_to_ifreq("tun0").expect("valid name");
        assert_eq!(ifreq_name(&req), "tun0");
    }

    #[test]
    fn rejects_name_too_long() {
        let name = "x".repeat(libc::IFNAMSIZ);
        assert!(name_to_ifreq(&name).is_err());
    }
}

//! Device-bound socket support.
//!
//! Probing a specific tunnel requires the UDP socket to be tied to that
//! network device, otherwise the kernel may route probes over another path.

use std::io;
use std::net::UdpSocket;

/// Binds `socket` to the network device `ifname` (`SO_BINDTODEVICE`).
///
/// # Errors
/// Propagates the setsockopt failure; usually `EPERM` without
/// `CAP_NET_RAW` on older kernels, or `ENODEV` for an unknown device.
#[cfg(target_os = "linux")]
pub fn bind_to_device(socket: &UdpSocket, ifname: &str) -> io::Result<()> {
    use std::ffi::OsString;

    use nix::sys::socket::{setsockopt, sockopt::BindToDevice};

    setsockopt(socket, BindToDevice, &OsString::from(ifname)).map_err(io::Error::from)
}

/// Device binding is a Linux-only capability.
#[cfg(not(target_os = "linux"))]
pub fn bind_to_device(_socket: &UdpSocket, _ifname: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "device-bound sockets require SO_BINDTODEVICE (Linux only)",
    ))
}

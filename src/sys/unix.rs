use std::{
    io::{self, IoSlice},
    mem::{self, MaybeUninit},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket},
    os::unix::io::AsRawFd,
    ptr,
};

use socket2::SockAddr;

use super::SocketOps;
use crate::{cmsg, RecvMeta};

/// Matches the kernel's iovec ceiling (UIO_MAXIOV)
pub(crate) const MAX_SEND_REGIONS: usize = 1024;

const CMSG_LEN: usize = 88;

/// A non-blocking UDP socket prepared for per-packet address reporting
/// and segmented sends.
#[derive(Debug)]
pub struct UdpSocketState {
    // None once closed; the fd is released on drop
    socket: Option<UdpSocket>,
    max_gso_segments: usize,
}

impl UdpSocketState {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::from_std(UdpSocket::bind(addr)?)
    }

    pub fn from_std(socket: UdpSocket) -> io::Result<Self> {
        init(&socket)?;
        Ok(Self {
            socket: Some(socket),
            max_gso_segments: max_gso_segments().unwrap_or(1),
        })
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn io(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }

    fn sendmsg(
        &self,
        bufs: &[IoSlice<'_>],
        addr: Option<SocketAddr>,
        segment_size: Option<usize>,
    ) -> io::Result<usize> {
        debug_assert!(!bufs.is_empty());
        debug_assert!(bufs.len() <= MAX_SEND_REGIONS);
        let socket = self.io()?;

        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        let mut ctrl = cmsg::Aligned([0u8; CMSG_LEN]);
        let dst = addr.map(SockAddr::from);
        if let Some(dst) = &dst {
            // sendmsg never writes through msg_name; the field is only
            // mutable because recvmsg shares the struct.
            hdr.msg_name = dst.as_ptr() as *mut _;
            hdr.msg_namelen = dst.len();
        }
        hdr.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        hdr.msg_iovlen = bufs.len() as _;

        hdr.msg_control = ctrl.0.as_mut_ptr() as _;
        hdr.msg_controllen = CMSG_LEN as _;
        let mut encoder = unsafe { cmsg::Encoder::new(&mut hdr) };
        #[cfg(target_os = "linux")]
        if let Some(segment_size) = segment_size {
            // The outbound filter caps payloads at one segment when the
            // probe found no GSO support.
            if self.max_gso_segments > 1 {
                encoder.push(libc::SOL_UDP, libc::UDP_SEGMENT, segment_size as u16);
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = segment_size;
        encoder.finish();

        loop {
            let n = unsafe { libc::sendmsg(socket.as_raw_fd(), &hdr, 0) };
            if n == -1 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            return Ok(n as usize);
        }
    }
}

impl SocketOps for UdpSocketState {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io()?.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.io()?.peer_addr()
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.io()?.connect(addr)
    }

    fn disconnect(&mut self) -> io::Result<()> {
        let socket = self.io()?;
        // Dissolve the association by connecting to AF_UNSPEC.
        let mut addr: libc::sockaddr = unsafe { mem::zeroed() };
        addr.sa_family = libc::AF_UNSPEC as libc::sa_family_t;
        let rc = unsafe {
            libc::connect(
                socket.as_raw_fd(),
                &addr,
                mem::size_of::<libc::sockaddr>() as libc::socklen_t,
            )
        };
        if rc == -1 {
            let e = io::Error::last_os_error();
            // Several BSDs report EAFNOSUPPORT even though the
            // association was dissolved.
            if e.raw_os_error() != Some(libc::EAFNOSUPPORT) {
                return Err(e);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.socket = None;
        Ok(())
    }

    fn max_gso_segments(&self) -> usize {
        self.max_gso_segments
    }

    fn recv_connected(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let socket = self.io()?;
        loop {
            match socket.recv(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                res => return res,
            }
        }
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<RecvMeta>> {
        let socket = self.io()?;
        let mut name = MaybeUninit::<libc::sockaddr_storage>::uninit();
        let mut ctrl = cmsg::Aligned(MaybeUninit::<[u8; CMSG_LEN]>::uninit());
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut _,
            iov_len: buf.len(),
        };
        let mut hdr = unsafe { mem::zeroed::<libc::msghdr>() };
        hdr.msg_name = name.as_mut_ptr() as _;
        hdr.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as _;
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;
        hdr.msg_control = ctrl.0.as_mut_ptr() as _;
        hdr.msg_controllen = CMSG_LEN as _;

        let n = loop {
            let n = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut hdr, 0) };
            if n == -1 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                if e.kind() == io::ErrorKind::WouldBlock {
                    return Ok(None);
                }
                return Err(e);
            }
            break n;
        };
        Ok(Some(decode_recv(&name, &hdr, n as usize)))
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let socket = self.io()?;
        loop {
            match socket.send(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                res => return res,
            }
        }
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let socket = self.io()?;
        loop {
            match socket.send_to(buf, addr) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                res => return res,
            }
        }
    }

    fn sendv(&mut self, bufs: &[IoSlice<'_>], segment_size: Option<usize>) -> io::Result<usize> {
        self.sendmsg(bufs, None, segment_size)
    }

    fn sendv_to(
        &mut self,
        bufs: &[IoSlice<'_>],
        addr: SocketAddr,
        segment_size: Option<usize>,
    ) -> io::Result<usize> {
        self.sendmsg(bufs, Some(addr), segment_size)
    }
}

fn init(io: &UdpSocket) -> io::Result<()> {
    assert!(
        CMSG_LEN >= unsafe { libc::CMSG_SPACE(mem::size_of::<libc::in6_pktinfo>() as _) as usize }
    );
    assert!(
        mem::align_of::<libc::cmsghdr>() <= mem::align_of::<cmsg::Aligned<[u8; 0]>>(),
        "control message buffers will be misaligned"
    );

    io.set_nonblocking(true)?;

    let addr = io.local_addr()?;
    let only_v6 = if addr.is_ipv6() {
        socket2::SockRef::from(io).only_v6()?
    } else {
        false
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if addr.is_ipv4() || !only_v6 {
            set_socket_option(io, libc::IPPROTO_IP, libc::IP_PKTINFO, 1)?;
        }
        if addr.is_ipv6() {
            set_socket_option(io, libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO, 1)?;
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let _ = only_v6;

    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_socket_option(
    socket: &impl AsRawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &value as *const _ as _,
            mem::size_of_val(&value) as _,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn decode_recv(
    name: &MaybeUninit<libc::sockaddr_storage>,
    hdr: &libc::msghdr,
    len: usize,
) -> RecvMeta {
    let name = unsafe { name.assume_init() };
    #[allow(unused_mut)]
    let mut local_ip: Option<IpAddr> = None;

    let cmsg_iter = unsafe { cmsg::Iter::new(hdr) };
    for cmsg in cmsg_iter {
        match (cmsg.cmsg_level, cmsg.cmsg_type) {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            (libc::IPPROTO_IP, libc::IP_PKTINFO) => unsafe {
                let pktinfo = cmsg::decode::<libc::in_pktinfo>(cmsg);
                local_ip = Some(IpAddr::V4(Ipv4Addr::from(pktinfo.ipi_addr.s_addr.to_ne_bytes())));
            },
            #[cfg(any(target_os = "linux", target_os = "android"))]
            (libc::IPPROTO_IPV6, libc::IPV6_PKTINFO) => unsafe {
                let pktinfo = cmsg::decode::<libc::in6_pktinfo>(cmsg);
                local_ip = Some(IpAddr::V6(Ipv6Addr::from(pktinfo.ipi6_addr.s6_addr)));
            },
            _ => {}
        }
    }

    let remote = match libc::c_int::from(name.ss_family) {
        libc::AF_INET => {
            let addr = unsafe { ptr::read(&name as *const _ as *const libc::sockaddr_in) };
            SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
                u16::from_be(addr.sin_port),
            ))
        }
        libc::AF_INET6 => {
            let addr = unsafe { ptr::read(&name as *const _ as *const libc::sockaddr_in6) };
            SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(addr.sin6_addr.s6_addr),
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            ))
        }
        _ => unreachable!(),
    };

    RecvMeta {
        len,
        remote,
        local_ip,
    }
}

#[cfg(target_os = "linux")]
fn max_gso_segments() -> io::Result<usize> {
    // Probe for GSO support by setting UDP_SEGMENT on a throwaway socket.
    const GSO_SIZE: libc::c_int = 1500;
    let socket = UdpSocket::bind("[::]:0").or_else(|_| UdpSocket::bind("0.0.0.0:0"))?;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_UDP,
            libc::UDP_SEGMENT,
            &GSO_SIZE as *const _ as _,
            mem::size_of_val(&GSO_SIZE) as _,
        )
    };
    Ok(if rc != -1 {
        // UDP_MAX_SEGMENTS, as defined in linux/udp.h
        64
    } else {
        1
    })
}

#[cfg(not(target_os = "linux"))]
fn max_gso_segments() -> io::Result<usize> {
    Ok(1)
}

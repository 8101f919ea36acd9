// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broadcast UDP discovery socket.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};

use super::DiscoverySocket;

/// Discovery socket bound to `0.0.0.0:<port>`, sending to `<broadcast>:<port>`.
///
/// Several nodes on one host share the port (SO_REUSEADDR/SO_REUSEPORT),
/// so every local node sees every broadcast.
pub struct UdpDiscovery {
    socket: mio::net::UdpSocket,
    target: SocketAddr,
}

impl UdpDiscovery {
    pub fn bind(port: u16, broadcast: Ipv4Addr) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;

        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&local.into())?;
        log::debug!(
            "[discovery] bound {} (broadcast target {}:{})",
            local,
            broadcast,
            port
        );

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(Self {
            socket: mio::net::UdpSocket::from_std(std_socket),
            target: SocketAddr::V4(SocketAddrV4::new(broadcast, port)),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DiscoverySocket for UdpDiscovery {
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.socket, token, Interest::READABLE)
    }

    fn broadcast(&mut self, datagram: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(datagram, self.target)?;
        if sent != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {} of {} bytes", sent, datagram.len()),
            ));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((n, _from)) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

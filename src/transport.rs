use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};

/// A destination for fully formatted metric payloads.
///
/// The production implementation is [`UdpSink`]. The trait exists so payloads can be
/// routed elsewhere, most usefully into a recording sink in tests via
/// [`DogStatsDBuilder::build_with_sink`](crate::DogStatsDBuilder::build_with_sink).
pub trait MetricSink {
    /// Sends one payload, returning the number of bytes handed to the OS.
    ///
    /// Datagram sends are atomic; a payload is either transmitted whole or not at
    /// all. Failures are reported, never retried.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;
}

/// Sends payloads to a DogStatsD server as UDP datagrams.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    /// Creates a sink bound to an ephemeral local port and connected to `addrs`.
    ///
    /// The socket is connected eagerly so that a bad destination surfaces here, at
    /// construction, instead of on the first send. The socket closes when the sink is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound, connected, or configured.
    pub fn connect(addrs: &[SocketAddr], write_timeout: Duration) -> io::Result<Self> {
        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
            socket.connect(addrs)?;
            socket.set_write_timeout(Some(write_timeout))?;
            Ok(UdpSink { socket })
        })
    }
}

impl MetricSink for UdpSink {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send(payload)
    }
}

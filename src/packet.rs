use std::net::SocketAddr;

use bytes::BytesMut;

use crate::{buf::SendBuf, error::TransportError};

/// An outbound message accepted by the write engine.
///
/// [`DatagramChannel::filter_outbound`](crate::DatagramChannel::filter_outbound)
/// normalizes every variant into a shape one native call can consume.
#[derive(Debug)]
pub enum Outbound {
    /// Payload for a connected socket, no explicit recipient
    Buffer(SendBuf),
    /// Addressed datagram
    Datagram {
        payload: SendBuf,
        recipient: SocketAddr,
    },
    /// Request to send one payload as multiple segment-sized packets
    Segmented(SegmentedPacket),
}

/// A send request that asks the OS to split one payload into
/// segment-sized network packets (generic segmentation offload).
///
/// The last segment may be smaller than `segment_size`. Construction
/// fails fast on a zero segment size; segment size and addressing are
/// immutable once built.
#[derive(Debug)]
pub struct SegmentedPacket {
    payload: SendBuf,
    segment_size: usize,
    recipient: SocketAddr,
    sender: Option<SocketAddr>,
}

impl SegmentedPacket {
    pub fn new(
        payload: impl Into<SendBuf>,
        segment_size: usize,
        recipient: SocketAddr,
    ) -> Result<Self, TransportError> {
        if segment_size == 0 {
            return Err(TransportError::InvalidArgument("segment_size"));
        }
        Ok(Self {
            payload: payload.into(),
            segment_size,
            recipient,
            sender: None,
        })
    }

    /// Like [`new`](Self::new), with an explicit sender address instead of
    /// the socket's bound address
    pub fn with_sender(
        payload: impl Into<SendBuf>,
        segment_size: usize,
        recipient: SocketAddr,
        sender: SocketAddr,
    ) -> Result<Self, TransportError> {
        let mut packet = Self::new(payload, segment_size, recipient)?;
        packet.sender = Some(sender);
        Ok(packet)
    }

    /// Size of each segment the OS will emit
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn recipient(&self) -> SocketAddr {
        self.recipient
    }

    pub fn sender(&self) -> Option<SocketAddr> {
        self.sender
    }

    pub fn payload(&self) -> &SendBuf {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut SendBuf {
        &mut self.payload
    }

    /// Returns a new packet carrying `payload`, preserving segment size
    /// and both addresses without re-validation
    pub fn replace(&self, payload: impl Into<SendBuf>) -> Self {
        Self {
            payload: payload.into(),
            segment_size: self.segment_size,
            recipient: self.recipient,
            sender: self.sender,
        }
    }

    pub(crate) fn into_parts(self) -> (SendBuf, usize, SocketAddr, Option<SocketAddr>) {
        (self.payload, self.segment_size, self.recipient, self.sender)
    }
}

/// A received datagram: payload plus resolved local and remote addresses.
///
/// Constructed fresh per datagram by the read loop and handed downstream
/// whole; every delivered packet has valid addresses and a non-empty
/// payload slot.
#[derive(Debug)]
pub struct DatagramPacket {
    payload: BytesMut,
    local: SocketAddr,
    remote: SocketAddr,
}

impl DatagramPacket {
    pub(crate) fn new(payload: BytesMut, local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            payload,
            local,
            remote,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Address the datagram was delivered to
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Address the datagram came from
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn into_payload(self) -> BytesMut {
        self.payload
    }
}

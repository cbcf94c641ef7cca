use std::{io, io::IoSlice, net::SocketAddr};

use tracing::trace;

use crate::{
    buf::SendBuf,
    channel::DatagramChannel,
    error::TransportError,
    log_send_error,
    packet::Outbound,
    sys::SocketOps,
};

impl<S: SocketOps> DatagramChannel<S> {
    /// Writes one outbound message, returning whether it was fully
    /// consumed.
    ///
    /// `false` means the OS would not take (all of) the datagram right
    /// now; the remainder stays in the message for a later call once the
    /// socket signals writability again. Messages should have passed
    /// [`filter_outbound`](Self::filter_outbound) first.
    pub fn write(&mut self, msg: &mut Outbound) -> Result<bool, TransportError> {
        self.assert_owning_thread();
        let (payload, recipient, segment_size) = match msg {
            Outbound::Buffer(payload) => (payload, None, None),
            Outbound::Datagram { payload, recipient } => (payload, Some(*recipient), None),
            Outbound::Segmented(packet) => {
                let recipient = packet.recipient();
                let segment_size = packet.segment_size();
                (packet.payload_mut(), Some(recipient), Some(segment_size))
            }
        };

        if payload.is_empty() {
            return Ok(true);
        }

        // A segmented payload always travels as one descriptor set so the
        // segment size option can ride along; the OS does the splitting.
        if payload.region_count() > 1 || segment_size.is_some() {
            self.write_vectored(payload, recipient, segment_size)
        } else {
            self.write_single(payload, recipient)
        }
    }

    fn write_vectored(
        &mut self,
        payload: &mut SendBuf,
        recipient: Option<SocketAddr>,
        segment_size: Option<usize>,
    ) -> Result<bool, TransportError> {
        let mut iov: Vec<IoSlice<'_>> = Vec::with_capacity(payload.region_count());
        payload.chunks(&mut iov);
        debug_assert!(!iov.is_empty());

        let result = match recipient {
            None => self.socket.sendv(&iov, segment_size),
            Some(addr) => self.socket.sendv_to(&iov, addr, segment_size),
        };
        drop(iov);
        match result {
            // The vectorized datagram primitive is all-or-nothing: a
            // positive return consumed the whole message.
            Ok(n) if n > 0 => {
                trace!(written = n, "vectorized send");
                payload.advance(payload.remaining());
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => {
                log_send_error(&mut self.last_send_error, &e, payload.remaining());
                Err(TransportError::Io(e))
            }
        }
    }

    fn write_single(
        &mut self,
        payload: &mut SendBuf,
        recipient: Option<SocketAddr>,
    ) -> Result<bool, TransportError> {
        let before = payload.remaining();
        let region = match payload.first_region() {
            Some(region) => region,
            None => return Ok(true),
        };
        let result = match recipient {
            None => self.socket.send(region),
            Some(addr) => self.socket.send_to(region, addr),
        };
        match result {
            Ok(written) => {
                trace!(written, "single region send");
                payload.advance(written);
                // A short write keeps its remainder for the next call.
                Ok(payload.is_empty())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => {
                log_send_error(&mut self.last_send_error, &e, before);
                Err(TransportError::Io(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::ChannelConfig,
        packet::SegmentedPacket,
        test_util::{MockSocket, SendCall},
    };
    use bytes::Bytes;

    fn channel(socket: MockSocket) -> DatagramChannel<MockSocket> {
        DatagramChannel::new(socket, ChannelConfig::default()).unwrap()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4433".parse().unwrap()
    }

    #[test]
    fn empty_payload_is_consumed_without_a_native_call() {
        let mut chan = channel(MockSocket::bound("127.0.0.1:7000"));
        let mut msg = Outbound::Buffer(SendBuf::new());
        assert!(chan.write(&mut msg).unwrap());
        assert!(chan.socket.send_calls.is_empty());
    }

    #[test]
    fn single_region_never_goes_vectorized() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket.send_results.push_back(Ok(5));
        let mut chan = channel(socket);

        let mut msg = Outbound::Datagram {
            payload: SendBuf::from(Bytes::from_static(b"hello")),
            recipient: addr(),
        };
        assert!(chan.write(&mut msg).unwrap());
        assert_eq!(chan.socket.send_calls.len(), 1);
        assert!(matches!(
            chan.socket.send_calls[0],
            SendCall::SendTo { len: 5, .. }
        ));
    }

    #[test]
    fn multi_region_always_goes_vectorized() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket.send_results.push_back(Ok(10));
        let mut chan = channel(socket);

        let payload: SendBuf = [Bytes::from_static(b"hello"), Bytes::from_static(b"world")]
            .into_iter()
            .collect();
        let mut msg = Outbound::Buffer(payload);
        assert!(chan.write(&mut msg).unwrap());
        assert_eq!(chan.socket.send_calls.len(), 1);
        assert!(matches!(
            chan.socket.send_calls[0],
            SendCall::Sendv {
                regions: 2,
                len: 10,
                segment_size: None,
            }
        ));
    }

    #[test]
    fn partial_single_region_write_keeps_the_remainder() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket.send_results.push_back(Ok(3));
        let mut chan = channel(socket);

        let mut msg = Outbound::Buffer(SendBuf::from(Bytes::from_static(b"hello")));
        // Cursor advances by exactly the reported amount and the message
        // stays queued for a later call.
        assert!(!chan.write(&mut msg).unwrap());
        match &msg {
            Outbound::Buffer(payload) => assert_eq!(payload.remaining(), 2),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn zero_byte_write_reports_not_consumed() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket.send_results.push_back(Ok(0));
        let mut chan = channel(socket);

        let mut msg = Outbound::Buffer(SendBuf::from(Bytes::from_static(b"hello")));
        assert!(!chan.write(&mut msg).unwrap());
        match &msg {
            Outbound::Buffer(payload) => assert_eq!(payload.remaining(), 5),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn would_block_reports_not_consumed() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket
            .send_results
            .push_back(Err(io::Error::from(io::ErrorKind::WouldBlock)));
        let mut chan = channel(socket);

        let mut msg = Outbound::Buffer(SendBuf::from(Bytes::from_static(b"hello")));
        assert!(!chan.write(&mut msg).unwrap());
    }

    #[test]
    fn positive_vectorized_return_consumes_everything() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        // The OS reports fewer bytes than the payload holds; the
        // vectorized contract still treats the message as consumed.
        socket.send_results.push_back(Ok(1));
        let mut chan = channel(socket);

        let payload: SendBuf = [Bytes::from_static(b"hello"), Bytes::from_static(b"world")]
            .into_iter()
            .collect();
        let mut msg = Outbound::Buffer(payload);
        assert!(chan.write(&mut msg).unwrap());
        match &msg {
            Outbound::Buffer(payload) => assert!(payload.is_empty()),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn segmented_send_is_one_native_call_with_the_full_payload() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket.send_results.push_back(Ok(9000));
        let mut chan = channel(socket);

        let packet =
            SegmentedPacket::new(Bytes::from(vec![0xAB; 9000]), 1500, addr()).unwrap();
        let mut msg = Outbound::Segmented(packet);
        assert!(chan.write(&mut msg).unwrap());
        assert_eq!(chan.socket.send_calls.len(), 1);
        assert!(matches!(
            chan.socket.send_calls[0],
            SendCall::SendvTo {
                regions: 1,
                len: 9000,
                segment_size: Some(1500),
                ..
            }
        ));
    }

    #[test]
    fn native_send_failure_surfaces_as_io() {
        let mut socket = MockSocket::bound("127.0.0.1:7000");
        socket
            .send_results
            .push_back(Err(io::Error::new(io::ErrorKind::Other, "sendmsg failed")));
        let mut chan = channel(socket);

        let mut msg = Outbound::Buffer(SendBuf::from(Bytes::from_static(b"hello")));
        let err = chan.write(&mut msg).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}

use crate::{error::TransportError, packet::DatagramPacket};

/// Downstream consumer of a read burst.
///
/// Per burst the channel fires `on_packet` zero or more times, then
/// `on_read_complete` exactly once, then `on_error` at most once with the
/// error that terminated the burst. Packet ownership transfers on
/// delivery; the channel never touches a packet afterwards.
pub trait PacketSink {
    fn on_packet(&mut self, packet: DatagramPacket);

    fn on_read_complete(&mut self);

    fn on_error(&mut self, error: TransportError);
}

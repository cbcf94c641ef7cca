use std::{collections::VecDeque, io::IoSlice};

use bytes::{Buf, Bytes, BytesMut};

/// Outbound payload storage: an ordered sequence of contiguous regions
/// with a read cursor.
///
/// The write engine consumes a `SendBuf` front to back, advancing the
/// cursor by exactly what the OS reports written. A partially written
/// payload keeps its remainder for a later call.
#[derive(Debug, Default)]
pub struct SendBuf {
    regions: VecDeque<Bytes>,
    remaining: usize,
}

impl SendBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region to the back of the payload. Empty regions are
    /// dropped, so `region_count` only counts readable regions.
    pub fn push(&mut self, region: Bytes) {
        if region.is_empty() {
            return;
        }
        self.remaining += region.len();
        self.regions.push_back(region);
    }

    /// Unread byte count across all regions
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Number of unread contiguous regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Gathers the unread regions into `dst` for a vectorized native call
    pub fn chunks<'a>(&'a self, dst: &mut Vec<IoSlice<'a>>) {
        dst.extend(self.regions.iter().map(|r| IoSlice::new(r)));
    }

    /// First unread region, if any
    pub fn first_region(&self) -> Option<&[u8]> {
        self.regions.front().map(|r| r.as_ref())
    }

    /// Consumes `n` bytes from the front of the payload, across region
    /// boundaries. `n` must not exceed `remaining`.
    pub fn advance(&mut self, mut n: usize) {
        assert!(n <= self.remaining, "advanced past the end of a SendBuf");
        self.remaining -= n;
        while n > 0 {
            let front = self
                .regions
                .front_mut()
                .expect("SendBuf region accounting out of sync");
            if n < front.len() {
                front.advance(n);
                return;
            }
            n -= front.len();
            self.regions.pop_front();
        }
    }

    /// Copies the unread content into a single freshly allocated region,
    /// consuming the original regions
    pub fn coalesce(self) -> Self {
        let mut flat = BytesMut::with_capacity(self.remaining);
        for region in &self.regions {
            flat.extend_from_slice(region);
        }
        Self::from(flat.freeze())
    }

    /// Copies the unread content out, without consuming the payload
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.remaining);
        for region in &self.regions {
            out.extend_from_slice(region);
        }
        out
    }
}

impl From<Bytes> for SendBuf {
    fn from(region: Bytes) -> Self {
        let mut buf = Self::new();
        buf.push(region);
        buf
    }
}

impl From<Vec<u8>> for SendBuf {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<&[u8]> for SendBuf {
    fn from(bytes: &[u8]) -> Self {
        Self::from(Bytes::copy_from_slice(bytes))
    }
}

impl FromIterator<Bytes> for SendBuf {
    fn from_iter<T: IntoIterator<Item = Bytes>>(iter: T) -> Self {
        let mut buf = Self::new();
        for region in iter {
            buf.push(region);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_regions() -> SendBuf {
        [
            Bytes::from_static(b"hello "),
            Bytes::from_static(b"datagram "),
            Bytes::from_static(b"world"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn empty_regions_are_dropped() {
        let buf: SendBuf = [Bytes::new(), Bytes::from_static(b"x"), Bytes::new()]
            .into_iter()
            .collect();
        assert_eq!(buf.region_count(), 1);
        assert_eq!(buf.remaining(), 1);
    }

    #[test]
    fn advance_crosses_region_boundaries() {
        let mut buf = three_regions();
        assert_eq!(buf.remaining(), 20);
        buf.advance(8);
        assert_eq!(buf.remaining(), 12);
        assert_eq!(buf.region_count(), 2);
        assert_eq!(buf.first_region(), Some(&b"tagram "[..]));
        buf.advance(12);
        assert!(buf.is_empty());
        assert_eq!(buf.region_count(), 0);
    }

    #[test]
    #[should_panic(expected = "advanced past the end")]
    fn advance_past_end_panics() {
        three_regions().advance(21);
    }

    #[test]
    fn chunks_gathers_every_region() {
        let buf = three_regions();
        let mut iov = Vec::new();
        buf.chunks(&mut iov);
        assert_eq!(iov.len(), 3);
        let total: usize = iov.iter().map(|s| s.len()).sum();
        assert_eq!(total, buf.remaining());
    }

    #[test]
    fn coalesce_preserves_content() {
        let mut buf = three_regions();
        buf.advance(6);
        let expected = buf.to_vec();
        let flat = buf.coalesce();
        assert_eq!(flat.region_count(), 1);
        assert_eq!(flat.to_vec(), expected);
        assert_eq!(flat.to_vec(), b"datagram world");
    }
}

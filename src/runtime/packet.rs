//! Timestamped packets carried on streams

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::Arc;

/// Logical time of a packet on a stream
///
/// Timestamps are opaque ticks chosen by whoever feeds the graph. The runtime
/// only requires that they strictly increase along each stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// Signed distance between two timestamps
///
/// Nodes use this at open time to tell the runtime how far their output
/// timestamps sit from the input that triggered them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampDiff(i64);

impl TimestampDiff {
    /// Output is emitted at the same timestamp as the triggering input
    pub const ZERO: TimestampDiff = TimestampDiff(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Add<TimestampDiff> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: TimestampDiff) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = TimestampDiff;

    fn sub(self, rhs: Timestamp) -> TimestampDiff {
        TimestampDiff(self.0 - rhs.0)
    }
}

/// A value bound to a timestamp
///
/// The payload is shared through an `Arc` so broadcasting a packet to several
/// consumers clones a pointer, never the value itself. Payloads are never
/// mutated once wrapped.
#[derive(Debug)]
pub struct Packet<T> {
    pub timestamp: Timestamp,
    pub payload: Arc<T>,
}

impl<T> Packet<T> {
    /// Wrap a freshly produced value
    pub fn new(payload: T, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            payload: Arc::new(payload),
        }
    }

    /// Borrow the payload
    pub fn get(&self) -> &T {
        &self.payload
    }
}

impl<T> Clone for Packet<T> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Packet[{}, {:?}]", self.timestamp, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_arithmetic() {
        let t = Timestamp::new(10);
        assert_eq!(t + TimestampDiff::ZERO, t);
        assert_eq!(t + TimestampDiff::new(-3), Timestamp::new(7));
        assert_eq!(Timestamp::new(12) - t, TimestampDiff::new(2));
    }

    #[test]
    fn test_clone_shares_payload() {
        let packet = Packet::new(vec![1u8, 2, 3], Timestamp::new(5));
        let copy = packet.clone();
        assert!(Arc::ptr_eq(&packet.payload, &copy.payload));
        assert_eq!(copy.timestamp, Timestamp::new(5));
    }
}

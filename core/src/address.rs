//! 6-byte node addresses and the two reserved values the wire format gives meaning to.

use std::fmt;

/// A 6-byte opaque device identifier.
///
/// The all-ones value ([`Address::BROADCAST`]) is reserved for broadcast
/// delivery; the all-zero value ([`Address::ZERO`]) is never a valid source
/// or destination and is rejected during header validation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 6]);

impl Address {
    pub const BROADCAST: Address = Address([0xFF; 6]);
    pub const ZERO: Address = Address([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Address(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// True for addresses that may legally appear as a packet's `src`.
    pub fn is_valid_source(&self) -> bool {
        !self.is_broadcast() && !self.is_zero()
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for Address {
    fn from(bytes: [u8; 6]) -> Self {
        Address(bytes)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Serialized as the colon-hex display form, so the admin JSON surface shows
/// addresses the same way logs and `Display` do rather than as a raw byte array.
impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_zero_are_distinct() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(!Address::BROADCAST.is_zero());
        assert!(Address::ZERO.is_zero());
        assert!(!Address::ZERO.is_broadcast());
    }

    #[test]
    fn ordinary_address_is_a_valid_source() {
        let a = Address::new([0x02, 0, 0, 0, 0, 1]);
        assert!(a.is_valid_source());
    }

    #[test]
    fn reserved_addresses_are_not_valid_sources() {
        assert!(!Address::BROADCAST.is_valid_source());
        assert!(!Address::ZERO.is_valid_source());
    }

    #[test]
    fn display_formats_as_colon_hex() {
        let a = Address::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(a.to_string(), "02:00:00:00:00:01");
    }
}

//! On-disk routing-table snapshot layout: a leading `count: u8` followed by
//! fixed-size packed records, the same layout used in memory (spec §6).
//! Writing the bytes to a filesystem path is the collaborator's job; this
//! module only does the byte-level encode/decode, exactly like `codec.rs`
//! does for packets.

use crate::address::Address;
use crate::routing::{RoutingEntry, RoutingStatus, DEFAULT_CAPACITY};

/// Bytes per packed routing record: address(6) + parent(6) + rssi(1) +
/// last_seen_ms(4) + status(1) + battery_mv present flag(1) + battery_mv(2).
pub const RECORD_LEN: usize = 6 + 6 + 1 + 4 + 1 + 1 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("snapshot is truncated: {0} bytes, need at least {1}")]
    Truncated(usize, usize),
    #[error("snapshot declares {0} records, exceeding capacity {1}")]
    OverCapacity(usize, usize),
    #[error("unrecognised routing status byte {0}")]
    BadStatus(u8),
}

fn encode_status(status: RoutingStatus) -> u8 {
    match status {
        RoutingStatus::Online => 0,
        RoutingStatus::Stale => 1,
        RoutingStatus::Offline => 2,
    }
}

fn decode_status(byte: u8) -> Result<RoutingStatus, PersistError> {
    match byte {
        0 => Ok(RoutingStatus::Online),
        1 => Ok(RoutingStatus::Stale),
        2 => Ok(RoutingStatus::Offline),
        other => Err(PersistError::BadStatus(other)),
    }
}

fn encode_record(out: &mut [u8], e: &RoutingEntry) {
    out[0..6].copy_from_slice(e.address.as_bytes());
    out[6..12].copy_from_slice(e.parent.as_bytes());
    out[12] = e.rssi as u8;
    out[13..17].copy_from_slice(&e.last_seen_ms.to_le_bytes());
    out[17] = encode_status(e.status);
    match e.battery_mv {
        Some(mv) => {
            out[18] = 1;
            out[19..21].copy_from_slice(&mv.to_le_bytes());
        }
        None => {
            out[18] = 0;
            out[19..21].copy_from_slice(&[0, 0]);
        }
    }
}

fn decode_record(bytes: &[u8]) -> Result<RoutingEntry, PersistError> {
    let status = decode_status(bytes[17])?;
    let battery_mv = if bytes[18] != 0 {
        Some(u16::from_le_bytes([bytes[19], bytes[20]]))
    } else {
        None
    };
    Ok(RoutingEntry {
        address: Address::new(bytes[0..6].try_into().unwrap()),
        parent: Address::new(bytes[6..12].try_into().unwrap()),
        rssi: bytes[12] as i8,
        last_seen_ms: u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]),
        status,
        battery_mv,
    })
}

/// Encode a routing-table snapshot as `count: u8` followed by `count` packed
/// records. `entries.len()` must fit in a `u8` (bounded by table capacity,
/// which is itself `<= 255` in any sane configuration).
pub fn encode(entries: &[RoutingEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + entries.len() * RECORD_LEN);
    out.push(entries.len() as u8);
    for e in entries {
        let mut record = [0u8; RECORD_LEN];
        encode_record(&mut record, e);
        out.extend_from_slice(&record);
    }
    out
}

/// Decode a persisted snapshot, rejecting truncated input and declared
/// record counts beyond `capacity` (a corrupt-beyond-capacity snapshot is
/// one of the two [`crate::error::FatalError`] conditions — spec §7).
pub fn decode(bytes: &[u8], capacity: usize) -> Result<Vec<RoutingEntry>, PersistError> {
    if bytes.is_empty() {
        return Err(PersistError::Truncated(0, 1));
    }
    let count = bytes[0] as usize;
    if count > capacity {
        return Err(PersistError::OverCapacity(count, capacity));
    }
    let needed = 1 + count * RECORD_LEN;
    if bytes.len() < needed {
        return Err(PersistError::Truncated(bytes.len(), needed));
    }

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = 1 + i * RECORD_LEN;
        out.push(decode_record(&bytes[start..start + RECORD_LEN])?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u8, battery: Option<u16>) -> RoutingEntry {
        RoutingEntry {
            address: Address::new([2, 0, 0, 0, 0, n]),
            parent: Address::new([2, 0, 0, 0, 0, 1]),
            rssi: -50,
            last_seen_ms: 12_345,
            status: RoutingStatus::Online,
            battery_mv: battery,
        }
    }

    #[test]
    fn round_trips_empty_snapshot() {
        let bytes = encode(&[]);
        assert_eq!(bytes, vec![0u8]);
        assert_eq!(decode(&bytes, DEFAULT_CAPACITY).unwrap(), vec![]);
    }

    #[test]
    fn round_trips_entries_with_and_without_battery() {
        let entries = vec![entry(1, Some(3_300)), entry(2, None)];
        let bytes = encode(&entries);
        let back = decode(&bytes, DEFAULT_CAPACITY).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn decode_rejects_count_over_capacity() {
        let entries = vec![entry(1, None), entry(2, None)];
        let bytes = encode(&entries);
        assert_eq!(decode(&bytes, 1), Err(PersistError::OverCapacity(2, 1)));
    }

    #[test]
    fn decode_rejects_truncated_records() {
        let mut bytes = encode(&[entry(1, None)]);
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes, DEFAULT_CAPACITY).is_err());
    }
}

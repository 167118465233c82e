//! The fixed 210-byte packet layout and its pure byte-level encode/decode.
//!
//! This module does no semantic validation — it is a byte layout mapping
//! only. `network_id`/`version`/`ttl`/`src` checks live in [`crate::engine`].

use crate::address::Address;

/// Magic network id. Frames carrying any other value are silently dropped.
pub const NETWORK_ID: u16 = 0xFA23;
/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;
/// Total on-wire frame size.
pub const PACKET_LEN: usize = 210;
/// Payload capacity inside a packet, opaque to the codec.
pub const PAYLOAD_LEN: usize = 180;
/// Default TTL assigned to originated packets.
pub const DEFAULT_TTL: u8 = 7;
/// Link MTU headroom the 210-byte frame leaves unused.
pub const LINK_MTU: usize = 250;

/// Message type tag (`msg_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    DataSensor = 0x01,
    DataActuator = 0x02,
    CmdSet = 0x03,
    CmdGet = 0x04,
    RoutingUpdate = 0x05,
    Heartbeat = 0x06,
    Discovery = 0x07,
    CmdGroup = 0x08,
    EventBroadcast = 0x09,
    DeviceStateUpdate = 0x0A,
    Ack = 0x0E,
    Nack = 0x0F,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use MsgType::*;
        Some(match v {
            0x01 => DataSensor,
            0x02 => DataActuator,
            0x03 => CmdSet,
            0x04 => CmdGet,
            0x05 => RoutingUpdate,
            0x06 => Heartbeat,
            0x07 => Discovery,
            0x08 => CmdGroup,
            0x09 => EventBroadcast,
            0x0A => DeviceStateUpdate,
            0x0E => Ack,
            0x0F => Nack,
            _ => return None,
        })
    }
}

/// Header flag bits.
pub mod flags {
    pub const REQUIRE_ACK: u8 = 0x01;
    pub const LOCAL_PROCESS: u8 = 0x02;
    pub const EMERGENCY: u8 = 0x04;
    pub const ENCRYPTED: u8 = 0x08;
    pub const BROADCAST: u8 = 0x40;
}

/// Errors the pure codec layer can raise. Semantic rejections (bad magic,
/// version, ttl, src) are [`crate::error::IngressDrop::InvalidHeader`], not
/// this type — this type only covers malformed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame is {0} bytes, need at least {1}")]
    TooShort(usize, usize),
}

/// A decoded mesh packet. `payload` is opaque to the codec; interpretation
/// (sensor data, group command, emergency event, ...) is the engine's job
/// and depends on `msg_type` and whether `ENCRYPTED` is set.
#[derive(Clone, Copy)]
pub struct Packet {
    pub network_id: u16,
    pub version: u8,
    pub ttl: u8,
    pub packet_id: u32,
    pub src: Address,
    pub dst: Address,
    pub last_hop: Address,
    pub msg_type: u8,
    pub flags: u8,
    pub group_id: u16,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Packet {
    /// Build a packet with network_id/version already set correctly and
    /// `ttl = DEFAULT_TTL`, ready for the caller to fill in addressing and
    /// payload before encoding.
    pub fn new(src: Address, dst: Address, msg_type: u8, flags: u8, group_id: u16) -> Self {
        Packet {
            network_id: NETWORK_ID,
            version: PROTOCOL_VERSION,
            ttl: DEFAULT_TTL,
            packet_id: 0,
            src,
            dst,
            last_hop: src,
            msg_type,
            flags,
            group_id,
            payload: [0u8; PAYLOAD_LEN],
        }
    }

    pub fn has_flag(&self, bit: u8) -> bool {
        self.flags & bit != 0
    }

    /// The header bytes (everything but the payload), in on-wire order.
    /// This is exactly the AAD used for AEAD-encrypted payloads (§4.5 step 5).
    pub fn header_bytes(&self) -> [u8; PACKET_LEN - PAYLOAD_LEN] {
        let mut out = [0u8; PACKET_LEN - PAYLOAD_LEN];
        out[0..2].copy_from_slice(&self.network_id.to_le_bytes());
        out[2] = self.version;
        out[3] = self.ttl;
        out[4..8].copy_from_slice(&self.packet_id.to_le_bytes());
        out[8..14].copy_from_slice(self.src.as_bytes());
        out[14..20].copy_from_slice(self.dst.as_bytes());
        out[20..26].copy_from_slice(self.last_hop.as_bytes());
        out[26] = self.msg_type;
        out[27] = self.flags;
        out[28..30].copy_from_slice(&self.group_id.to_le_bytes());
        out
    }
}

/// Encode a packet to its fixed 210-byte wire representation. Never fails.
pub fn encode(p: &Packet) -> [u8; PACKET_LEN] {
    let mut out = [0u8; PACKET_LEN];
    out[0..30].copy_from_slice(&p.header_bytes());
    out[30..PACKET_LEN].copy_from_slice(&p.payload);
    out
}

/// Decode a packet from bytes. Fails only if the input is shorter than
/// [`PACKET_LEN`]; trailing bytes beyond that are ignored (the link layer
/// may deliver frames padded to its own MTU).
pub fn decode(bytes: &[u8]) -> Result<Packet, WireError> {
    if bytes.len() < PACKET_LEN {
        return Err(WireError::TooShort(bytes.len(), PACKET_LEN));
    }
    let network_id = u16::from_le_bytes([bytes[0], bytes[1]]);
    let version = bytes[2];
    let ttl = bytes[3];
    let packet_id = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let src = Address::new(bytes[8..14].try_into().unwrap());
    let dst = Address::new(bytes[14..20].try_into().unwrap());
    let last_hop = Address::new(bytes[20..26].try_into().unwrap());
    let msg_type = bytes[26];
    let flags = bytes[27];
    let group_id = u16::from_le_bytes([bytes[28], bytes[29]]);
    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&bytes[30..PACKET_LEN]);

    Ok(Packet {
        network_id,
        version,
        ttl,
        packet_id,
        src,
        dst,
        last_hop,
        msg_type,
        flags,
        group_id,
        payload,
    })
}

/// `DATA_SENSOR` payload layout (device -> coordinator), 18 of the 180
/// available payload bytes. Decode is tolerant of extra trailing bytes, the
/// same way the packet codec is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorData {
    pub device_type: u16,
    pub timestamp_s: u32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub battery_mv: u16,
    pub rssi: i8,
    pub accuracy_pct: u8,
}

impl SensorData {
    pub const ENCODED_LEN: usize = 18;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..2].copy_from_slice(&self.device_type.to_le_bytes());
        out[2..6].copy_from_slice(&self.timestamp_s.to_le_bytes());
        out[6..10].copy_from_slice(&self.temperature_c.to_le_bytes());
        out[10..14].copy_from_slice(&self.humidity_pct.to_le_bytes());
        out[14..16].copy_from_slice(&self.battery_mv.to_le_bytes());
        out[16] = self.rssi as u8;
        out[17] = self.accuracy_pct;
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(WireError::TooShort(bytes.len(), Self::ENCODED_LEN));
        }
        Ok(SensorData {
            device_type: u16::from_le_bytes([bytes[0], bytes[1]]),
            timestamp_s: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            temperature_c: f32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            humidity_pct: f32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
            battery_mv: u16::from_le_bytes([bytes[14], bytes[15]]),
            rssi: bytes[16] as i8,
            accuracy_pct: bytes[17],
        })
    }
}

/// `CMD_GROUP` payload layout: a group command with up to 16 bytes of
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupCommand {
    pub group_id: u16,
    pub command_code: u8,
    pub parameter_len: u8,
    pub parameters: [u8; 16],
}

impl GroupCommand {
    pub const ENCODED_LEN: usize = 4 + 16;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..2].copy_from_slice(&self.group_id.to_le_bytes());
        out[2] = self.command_code;
        out[3] = self.parameter_len;
        out[4..20].copy_from_slice(&self.parameters);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(WireError::TooShort(bytes.len(), Self::ENCODED_LEN));
        }
        let mut parameters = [0u8; 16];
        parameters.copy_from_slice(&bytes[4..20]);
        Ok(GroupCommand {
            group_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            command_code: bytes[2],
            parameter_len: bytes[3].min(16),
            parameters,
        })
    }

    /// The parameter bytes actually in use, per `parameter_len`.
    pub fn params(&self) -> &[u8] {
        &self.parameters[..self.parameter_len as usize]
    }
}

/// `EVENT_BROADCAST` payload layout. `extra` holds whatever event-specific
/// bytes follow the fixed header, up to the payload's remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmergencyEvent {
    pub event_type: u8,
    pub severity: u8,
    pub sensor_addr: Address,
    pub extra_len: u8,
    pub extra: [u8; 16],
}

impl EmergencyEvent {
    pub const FIXED_LEN: usize = 8;

    pub fn encode(&self) -> [u8; Self::FIXED_LEN + 16] {
        let mut out = [0u8; Self::FIXED_LEN + 16];
        out[0] = self.event_type;
        out[1] = self.severity;
        out[2..8].copy_from_slice(self.sensor_addr.as_bytes());
        out[8..24].copy_from_slice(&self.extra);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::FIXED_LEN {
            return Err(WireError::TooShort(bytes.len(), Self::FIXED_LEN));
        }
        let mut extra = [0u8; 16];
        let available = (bytes.len() - Self::FIXED_LEN).min(16);
        extra[..available].copy_from_slice(&bytes[Self::FIXED_LEN..Self::FIXED_LEN + available]);
        Ok(EmergencyEvent {
            event_type: bytes[0],
            severity: bytes[1],
            sensor_addr: Address::new(bytes[2..8].try_into().unwrap()),
            extra_len: available as u8,
            extra,
        })
    }

    pub fn extra_bytes(&self) -> &[u8] {
        &self.extra[..self.extra_len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Packet {
        let mut p = Packet::new(
            Address::new([2, 0, 0, 0, 0, 1]),
            Address::new([2, 0, 0, 0, 0, 2]),
            MsgType::CmdSet as u8,
            flags::REQUIRE_ACK,
            0,
        );
        p.packet_id = 0xDEAD_BEEF;
        p.last_hop = p.src;
        p.payload[0..5].copy_from_slice(b"hello");
        p
    }

    #[test]
    fn encode_is_exactly_210_bytes() {
        let bytes = encode(&sample());
        assert_eq!(bytes.len(), PACKET_LEN);
    }

    #[test]
    fn decode_of_encode_round_trips() {
        let p = sample();
        let bytes = encode(&p);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.network_id, p.network_id);
        assert_eq!(back.version, p.version);
        assert_eq!(back.ttl, p.ttl);
        assert_eq!(back.packet_id, p.packet_id);
        assert_eq!(back.src, p.src);
        assert_eq!(back.dst, p.dst);
        assert_eq!(back.last_hop, p.last_hop);
        assert_eq!(back.msg_type, p.msg_type);
        assert_eq!(back.flags, p.flags);
        assert_eq!(back.group_id, p.group_id);
        assert_eq!(back.payload, p.payload);
    }

    #[test]
    fn decode_rejects_short_input() {
        let bytes = [0u8; PACKET_LEN - 1];
        assert_eq!(decode(&bytes), Err(WireError::TooShort(209, PACKET_LEN)));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let p = sample();
        let mut bytes = encode(&p).to_vec();
        bytes.extend_from_slice(&[0xAA; 40]); // padded to LINK_MTU by the driver
        let back = decode(&bytes).unwrap();
        assert_eq!(back.packet_id, p.packet_id);
    }

    #[test]
    fn multi_byte_fields_are_little_endian_on_the_wire() {
        let mut p = sample();
        p.packet_id = 0x0102_0304;
        p.group_id = 0xBEEF;
        let bytes = encode(&p);
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[28..30], &[0xEF, 0xBE]);
    }

    #[test]
    fn header_bytes_exclude_payload() {
        let p = sample();
        assert_eq!(p.header_bytes().len(), PACKET_LEN - PAYLOAD_LEN);
    }

    #[test]
    fn sensor_data_round_trips() {
        let s = SensorData {
            device_type: 7,
            timestamp_s: 1_700_000_000,
            temperature_c: 41.5,
            humidity_pct: 55.25,
            battery_mv: 2_950,
            rssi: -62,
            accuracy_pct: 90,
        };
        let bytes = s.encode();
        assert_eq!(SensorData::decode(&bytes).unwrap(), s);
    }

    #[test]
    fn sensor_data_decode_rejects_short_input() {
        let bytes = [0u8; SensorData::ENCODED_LEN - 1];
        assert!(SensorData::decode(&bytes).is_err());
    }

    #[test]
    fn group_command_round_trips_and_clamps_params() {
        let mut params = [0u8; 16];
        params[0..3].copy_from_slice(b"abc");
        let g = GroupCommand {
            group_id: 99,
            command_code: 3,
            parameter_len: 3,
            parameters: params,
        };
        let bytes = g.encode();
        let back = GroupCommand::decode(&bytes).unwrap();
        assert_eq!(back, g);
        assert_eq!(back.params(), b"abc");
    }

    #[test]
    fn emergency_event_round_trips_with_extra_bytes() {
        let mut extra = [0u8; 16];
        extra[0..4].copy_from_slice(b"fire");
        let e = EmergencyEvent {
            event_type: 1,
            severity: 9,
            sensor_addr: Address::new([2, 0, 0, 0, 0, 5]),
            extra_len: 4,
            extra,
        };
        let bytes = e.encode();
        let back = EmergencyEvent::decode(&bytes).unwrap();
        assert_eq!(back, e);
        assert_eq!(back.extra_bytes(), b"fire");
    }

    #[test]
    fn emergency_event_decode_rejects_shorter_than_fixed_header() {
        let bytes = [0u8; EmergencyEvent::FIXED_LEN - 1];
        assert!(EmergencyEvent::decode(&bytes).is_err());
    }

    /// `decode(encode(p)) == p` across a batch of randomly generated packets,
    /// not just the one hand-built `sample()` (spec §8's first invariant).
    #[test]
    fn decode_of_encode_round_trips_for_random_packets() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        for _ in 0..256 {
            let mut src_bytes = [0u8; 6];
            let mut dst_bytes = [0u8; 6];
            let mut last_hop_bytes = [0u8; 6];
            rng.fill_bytes(&mut src_bytes);
            rng.fill_bytes(&mut dst_bytes);
            rng.fill_bytes(&mut last_hop_bytes);
            let mut p = Packet::new(
                Address::new(src_bytes),
                Address::new(dst_bytes),
                (rng.next_u32() % 0x10) as u8,
                rng.next_u32() as u8,
                rng.next_u32() as u16,
            );
            p.last_hop = Address::new(last_hop_bytes);
            p.ttl = rng.next_u32() as u8;
            p.packet_id = rng.next_u32();
            rng.fill_bytes(&mut p.payload);

            let bytes = encode(&p);
            let back = decode(&bytes).unwrap();
            assert_eq!(back.network_id, p.network_id);
            assert_eq!(back.version, p.version);
            assert_eq!(back.ttl, p.ttl);
            assert_eq!(back.packet_id, p.packet_id);
            assert_eq!(back.src, p.src);
            assert_eq!(back.dst, p.dst);
            assert_eq!(back.last_hop, p.last_hop);
            assert_eq!(back.msg_type, p.msg_type);
            assert_eq!(back.flags, p.flags);
            assert_eq!(back.group_id, p.group_id);
            assert_eq!(back.payload, p.payload);
        }
    }
}

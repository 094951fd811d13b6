//! Dictionary packet encoding and decoding.
//!
//! Packet format:
//! - COUNT (1 byte): number of tuples
//! - per tuple:
//!   - KEY (4 bytes, LE)
//!   - TYPE (1 byte): 0 byte array, 1 C string, 2 unsigned int, 3 signed int
//!   - LENGTH (2 bytes, LE): value length in bytes
//!   - VALUE: integers LE in 1, 2 or 4 bytes; strings NUL-terminated,
//!     terminator included in LENGTH

use crate::error::PacketError;

const TYPE_BYTES: u8 = 0;
const TYPE_CSTRING: u8 = 1;
const TYPE_UINT: u8 = 2;
const TYPE_INT: u8 = 3;

/// Tuple header: key + type + length
const TUPLE_HEADER_SIZE: usize = 4 + 1 + 2;

/// A typed dictionary value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    CString(String),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Int8(i8),
    Int16(i16),
    Int32(i32),
}

impl Value {
    fn type_tag(&self) -> u8 {
        match self {
            Value::Bytes(_) => TYPE_BYTES,
            Value::CString(_) => TYPE_CSTRING,
            Value::Uint8(_) | Value::Uint16(_) | Value::Uint32(_) => TYPE_UINT,
            Value::Int8(_) | Value::Int16(_) | Value::Int32(_) => TYPE_INT,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Value::Bytes(b) => b.len(),
            Value::CString(s) => s.len() + 1,
            Value::Uint8(_) | Value::Int8(_) => 1,
            Value::Uint16(_) | Value::Int16(_) => 2,
            Value::Uint32(_) | Value::Int32(_) => 4,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bytes(b) => out.extend_from_slice(b),
            Value::CString(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            Value::Uint8(v) => out.push(*v),
            Value::Uint16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Uint32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn read(type_tag: u8, raw: &[u8]) -> Result<Self, PacketError> {
        let bad_width = || PacketError::InvalidLength {
            type_tag,
            length: raw.len(),
        };
        match type_tag {
            TYPE_BYTES => Ok(Value::Bytes(raw.to_vec())),
            TYPE_CSTRING => {
                let text = match raw.split_last() {
                    Some((&0, text)) => text,
                    _ => return Err(PacketError::InvalidString),
                };
                String::from_utf8(text.to_vec())
                    .map(Value::CString)
                    .map_err(|_| PacketError::InvalidString)
            }
            TYPE_UINT => match *raw {
                [a] => Ok(Value::Uint8(a)),
                [a, b] => Ok(Value::Uint16(u16::from_le_bytes([a, b]))),
                [a, b, c, d] => Ok(Value::Uint32(u32::from_le_bytes([a, b, c, d]))),
                _ => Err(bad_width()),
            },
            TYPE_INT => match *raw {
                [a] => Ok(Value::Int8(i8::from_le_bytes([a]))),
                [a, b] => Ok(Value::Int16(i16::from_le_bytes([a, b]))),
                [a, b, c, d] => Ok(Value::Int32(i32::from_le_bytes([a, b, c, d]))),
                _ => Err(bad_width()),
            },
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Integer value widened to i64, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Uint8(v) => Some(i64::from(v)),
            Value::Uint16(v) => Some(i64::from(v)),
            Value::Uint32(v) => Some(i64::from(v)),
            Value::Int8(v) => Some(i64::from(v)),
            Value::Int16(v) => Some(i64::from(v)),
            Value::Int32(v) => Some(i64::from(v)),
            Value::Bytes(_) | Value::CString(_) => None,
        }
    }
}

/// Ordered key/value dictionary sent as one message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    tuples: Vec<(u32, Value)>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. Keeps first-insertion order.
    pub fn insert(&mut self, key: u32, value: Value) {
        match self.tuples.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.tuples.push((key, value)),
        }
    }

    pub fn with(mut self, key: u32, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: u32) -> Option<&Value> {
        self.tuples.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.tuples.iter().map(|(k, v)| (*k, v))
    }

    /// Encode into the dictionary wire format
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let count = u8::try_from(self.tuples.len())
            .map_err(|_| PacketError::TooManyTuples(self.tuples.len()))?;

        let size = 1 + self
            .tuples
            .iter()
            .map(|(_, v)| TUPLE_HEADER_SIZE + v.encoded_len())
            .sum::<usize>();
        let mut out = Vec::with_capacity(size);
        out.push(count);

        for (key, value) in &self.tuples {
            let length = u16::try_from(value.encoded_len()).map_err(|_| PacketError::ValueTooLarge {
                key: *key,
                length: value.encoded_len(),
            })?;
            out.extend_from_slice(&key.to_le_bytes());
            out.push(value.type_tag());
            out.extend_from_slice(&length.to_le_bytes());
            value.write_to(&mut out);
        }

        Ok(out)
    }

    /// Decode a complete packet. Trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let (&count, mut rest) = bytes.split_first().ok_or(PacketError::Truncated)?;
        let mut packet = Packet::new();

        for _ in 0..count {
            if rest.len() < TUPLE_HEADER_SIZE {
                return Err(PacketError::Truncated);
            }
            let key = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let type_tag = rest[4];
            let length = usize::from(u16::from_le_bytes([rest[5], rest[6]]));
            rest = &rest[TUPLE_HEADER_SIZE..];

            if rest.len() < length {
                return Err(PacketError::Truncated);
            }
            let (raw, tail) = rest.split_at(length);
            packet.insert(key, Value::read(type_tag, raw)?);
            rest = tail;
        }

        if !rest.is_empty() {
            return Err(PacketError::TrailingBytes(rest.len()));
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn test_encode_layout() {
        let packet = Packet::new()
            .with(keys::FORECAST_MINUTES, Value::Int16(-30))
            .with(keys::TEMPERATURE, Value::CString("3°".into()));
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes[0], 2);
        // key 46, signed, 2 bytes, -30 LE
        assert_eq!(&bytes[1..10], &[46, 0, 0, 0, 3, 2, 0, 0xE2, 0xFF]);
        // key 20, cstring, "3°" is 3 bytes + NUL
        assert_eq!(&bytes[10..17], &[20, 0, 0, 0, 1, 4, 0]);
        assert_eq!(&bytes[17..], &[b'3', 0xC2, 0xB0, 0]);
    }

    #[test]
    fn test_decode_mixed_packet() {
        let packet = Packet::new()
            .with(keys::LAT, Value::Int32(59_913))
            .with(keys::CLOUD_COVER, Value::Uint8(87))
            .with(keys::NOWCAST_MINUTES, Value::Bytes(vec![0, 5, 10]))
            .with(keys::LOCATION_NAME, Value::CString("Oslo".into()));
        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.get(keys::LAT).and_then(Value::as_i64), Some(59_913));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut packet = Packet::new()
            .with(keys::HELLO, Value::Uint8(1))
            .with(keys::TAP, Value::Uint8(2));
        packet.insert(keys::HELLO, Value::Uint8(9));
        let order: Vec<u32> = packet.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![keys::HELLO, keys::TAP]);
        assert_eq!(packet.get(keys::HELLO), Some(&Value::Uint8(9)));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::Truncated));
        assert_eq!(Packet::decode(&[1, 3, 0, 0, 0, 2]), Err(PacketError::Truncated));
        assert_eq!(
            Packet::decode(&[1, 3, 0, 0, 0, 2, 2, 0, 7]),
            Err(PacketError::Truncated)
        );
    }

    #[test]
    fn test_decode_rejects_bad_width() {
        let bytes = [1, 3, 0, 0, 0, 2, 3, 0, 1, 2, 3];
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::InvalidLength { type_tag: 2, length: 3 })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let bytes = [1, 3, 0, 0, 0, 9, 1, 0, 1];
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownType(9)));
    }

    #[test]
    fn test_decode_rejects_unterminated_string() {
        let bytes = [1, 16, 0, 0, 0, 1, 2, 0, b'h', b'i'];
        assert_eq!(Packet::decode(&bytes), Err(PacketError::InvalidString));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let bytes = [0, 0xAA];
        assert_eq!(Packet::decode(&bytes), Err(PacketError::TrailingBytes(1)));
    }

    #[test]
    fn test_encode_rejects_oversized_value() {
        let packet = Packet::new().with(keys::NOWCAST_MINUTES, Value::Bytes(vec![0; 70_000]));
        assert_eq!(
            packet.encode(),
            Err(PacketError::ValueTooLarge { key: 40, length: 70_000 })
        );
    }
}

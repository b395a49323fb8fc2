//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::fmt;

/// Largest identifier representable in an 11-bit standard frame.
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD: usize = 8;

/// Header length of the datagram encoding: identifier (2) + length (1).
const DATAGRAM_HEADER: usize = 3;

/// Largest well-formed datagram.
pub const MAX_DATAGRAM: usize = DATAGRAM_HEADER + MAX_PAYLOAD;

/// Errors raised while building or parsing frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Identifier does not fit in 11 bits.
    #[error("identifier 0x{0:X} exceeds the 11-bit standard range")]
    IdentifierOutOfRange(u16),
    /// Payload longer than [`MAX_PAYLOAD`] bytes.
    #[error("payload of {0} bytes exceeds the 8-byte frame limit")]
    PayloadTooLong(usize),
    /// Datagram shorter than its header or its declared length.
    #[error("datagram truncated: {0} bytes")]
    Truncated(usize),
    /// Datagram carries bytes beyond its declared payload length.
    #[error("datagram of {actual} bytes does not match declared payload length {declared}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// 11-bit standard frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StandardId(u16);

impl StandardId {
    /// Validate a raw identifier.
    pub const fn new(raw: u16) -> Option<Self> {
        if raw <= MAX_STANDARD_ID {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Build an identifier for the static table; out-of-range values fail const evaluation.
    pub(crate) const fn from_static(raw: u16) -> Self {
        assert!(raw <= MAX_STANDARD_ID, "identifier exceeds 11 bits");
        Self(raw)
    }

    /// Raw numeric identifier.
    pub const fn as_raw(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for StandardId {
    type Error = FrameError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(FrameError::IdentifierOutOfRange(raw))
    }
}

impl fmt::Display for StandardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// A single bus frame: one identifier and up to eight payload bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireMessage {
    id: StandardId,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl WireMessage {
    /// Build a frame, rejecting payloads longer than eight bytes.
    pub fn new(id: StandardId, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    /// Build a one-byte frame, the shape of every mapped field.
    pub fn byte(id: StandardId, value: u8) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        data[0] = value;
        Self { id, len: 1, data }
    }

    /// Frame identifier.
    pub fn id(&self) -> StandardId {
        self.id
    }

    /// Payload bytes actually carried.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First payload byte, where every mapped field keeps its value.
    pub fn first_byte(&self) -> Option<u8> {
        self.payload().first().copied()
    }

    /// Encode as `[id_hi, id_lo, len, payload...]` for datagram transports.
    pub fn to_datagram(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DATAGRAM_HEADER + self.len());
        out.extend_from_slice(&self.id.as_raw().to_be_bytes());
        out.push(self.len);
        out.extend_from_slice(self.payload());
        out
    }

    /// Decode the datagram encoding produced by [`WireMessage::to_datagram`].
    pub fn from_datagram(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < DATAGRAM_HEADER {
            return Err(FrameError::Truncated(bytes.len()));
        }
        let id = StandardId::try_from(u16::from_be_bytes([bytes[0], bytes[1]]))?;
        let len = usize::from(bytes[2]);
        if len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong(len));
        }
        let body = bytes
            .get(DATAGRAM_HEADER..DATAGRAM_HEADER + len)
            .ok_or(FrameError::Truncated(bytes.len()))?;
        if bytes.len() != DATAGRAM_HEADER + len {
            return Err(FrameError::LengthMismatch {
                declared: len,
                actual: bytes.len(),
            });
        }
        Self::new(id, body)
    }
}

impl fmt::Debug for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireMessage")
            .field("id", &format_args!("{}", self.id))
            .field("payload", &self.payload())
            .finish()
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.id)?;
        for (idx, byte) in self.payload().iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_identifiers_beyond_eleven_bits() {
        assert!(StandardId::new(0x7FF).is_some());
        assert_eq!(
            StandardId::try_from(0x800),
            Err(FrameError::IdentifierOutOfRange(0x800))
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let id = StandardId::from_static(0x014);
        assert_eq!(
            WireMessage::new(id, &[0; 9]),
            Err(FrameError::PayloadTooLong(9))
        );
        let empty = WireMessage::new(id, &[]).expect("empty frame is valid");
        assert!(empty.is_empty());
        assert_eq!(empty.first_byte(), None);
    }

    #[test]
    fn datagram_layout_is_big_endian_id_then_length() {
        let msg = WireMessage::byte(StandardId::from_static(0x046), 0x01);
        assert_eq!(msg.to_datagram(), vec![0x00, 0x46, 0x01, 0x01]);
        assert_eq!(WireMessage::from_datagram(&[0x00, 0x46, 0x01, 0x01]), Ok(msg));
    }

    #[test]
    fn truncated_datagrams_are_rejected() {
        assert_eq!(
            WireMessage::from_datagram(&[0x00]),
            Err(FrameError::Truncated(1))
        );
        assert_eq!(
            WireMessage::from_datagram(&[0x00, 0x20, 0x02, 0x10]),
            Err(FrameError::Truncated(4))
        );
        assert_eq!(
            WireMessage::from_datagram(&[0x08, 0x00, 0x00]),
            Err(FrameError::IdentifierOutOfRange(0x800))
        );
    }

    #[test]
    fn trailing_bytes_beyond_declared_length_are_rejected() {
        assert_eq!(
            WireMessage::from_datagram(&[0x00, 0x46, 0x01, 0x01, 0xAA]),
            Err(FrameError::LengthMismatch {
                declared: 1,
                actual: 5,
            })
        );
        let mut oversized = vec![0x00, 0x46, 0x01, 0x01];
        oversized.resize(64, 0xEE);
        assert!(matches!(
            WireMessage::from_datagram(&oversized),
            Err(FrameError::LengthMismatch { declared: 1, .. })
        ));
    }

    #[test]
    fn display_shows_identifier_and_bytes() {
        let msg = WireMessage::new(StandardId::from_static(0x2), &[0x7F, 0x01]).unwrap();
        assert_eq!(msg.to_string(), "0x002 [7F 01]");
    }
}

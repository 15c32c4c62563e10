//! OBEX-derived header model.
//!
//! A header identifier's top two bits select one of four value encodings;
//! the bottom six bits name the semantic field. Rather than storing the
//! encoding bits as a separately-settable field that must be kept in sync
//! with the value actually held (the invariant the original C model leans
//! on), [`HeaderValue`] is a tagged sum: the encoding is a pure projection
//! of which variant is active, so "encoding doesn't match value kind" is
//! unrepresentable.

use crate::error::ProtocolError;

/// Bits 7-6 of a header identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf16 = 0b00,
    ByteString = 0b01,
    Byte = 0b10,
    Word = 0b11,
}

impl Encoding {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Encoding::Utf16,
            0b01 => Encoding::ByteString,
            0b10 => Encoding::Byte,
            _ => Encoding::Word,
        }
    }

    fn bits(self) -> u8 {
        self as u8
    }
}

/// The standard header identifiers (bits 5-0) the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderId {
    Name,
    Length,
    Body,
    EndOfBody,
    ConnectionId,
    /// MIME-type-ish byte string, part of the standard registry but never
    /// constructed or consumed by this engine's own packets — recognized
    /// only so a peer that sends one round-trips instead of falling into
    /// `Unknown`.
    Type,
    Hostname,
    /// Any identifier this engine doesn't assign meaning to; headers using
    /// it are decoded (so framing stays correct) but otherwise ignored.
    Unknown(u8),
}

impl HeaderId {
    const NAME: u8 = 0x01;
    const TYPE: u8 = 0x42;
    const BODY: u8 = 0x48;
    const END_OF_BODY: u8 = 0x49;
    const LENGTH: u8 = 0xC3;
    const CONNECTION_ID: u8 = 0xCB;
    const HOSTNAME: u8 = 0x4C;

    fn meaning_bits(self) -> u8 {
        match self {
            HeaderId::Name => Self::NAME & 0x3F,
            HeaderId::Type => Self::TYPE & 0x3F,
            HeaderId::Body => Self::BODY & 0x3F,
            HeaderId::EndOfBody => Self::END_OF_BODY & 0x3F,
            HeaderId::Length => Self::LENGTH & 0x3F,
            HeaderId::ConnectionId => Self::CONNECTION_ID & 0x3F,
            HeaderId::Hostname => Self::HOSTNAME & 0x3F,
            HeaderId::Unknown(raw) => raw & 0x3F,
        }
    }

    fn default_encoding(self) -> Encoding {
        match self {
            HeaderId::Name => Encoding::Utf16,
            HeaderId::Length => Encoding::Word,
            HeaderId::Body => Encoding::ByteString,
            HeaderId::EndOfBody => Encoding::ByteString,
            HeaderId::ConnectionId => Encoding::Word,
            HeaderId::Type => Encoding::ByteString,
            HeaderId::Hostname => Encoding::ByteString,
            HeaderId::Unknown(_) => Encoding::ByteString,
        }
    }

    fn from_meaning(meaning: u8, encoding: Encoding) -> Self {
        match meaning {
            m if m == (Self::NAME & 0x3F) && encoding == Encoding::Utf16 => HeaderId::Name,
            m if m == (Self::TYPE & 0x3F) && encoding == Encoding::ByteString => HeaderId::Type,
            m if m == (Self::BODY & 0x3F) && encoding == Encoding::ByteString => HeaderId::Body,
            m if m == (Self::END_OF_BODY & 0x3F) && encoding == Encoding::ByteString => {
                HeaderId::EndOfBody
            }
            m if m == (Self::LENGTH & 0x3F) && encoding == Encoding::Word => HeaderId::Length,
            m if m == (Self::CONNECTION_ID & 0x3F) && encoding == Encoding::Word => {
                HeaderId::ConnectionId
            }
            m if m == (Self::HOSTNAME & 0x3F) && encoding == Encoding::ByteString => {
                HeaderId::Hostname
            }
            _ => HeaderId::Unknown((encoding.bits() << 6) | (meaning & 0x3F)),
        }
    }

    /// The full identifier byte for this field, encoding bits included.
    pub fn id_byte(self) -> u8 {
        (self.default_encoding().bits() << 6) | self.meaning_bits()
    }
}

/// A header value. The variant IS the encoding — there is no separate
/// "encoding" field to fall out of sync with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// UTF-16BE string, NUL (zero code unit) terminated on the wire.
    Utf16(String),
    /// NUL-terminated 8-bit string. Stored without the trailing NUL.
    ByteString(String),
    /// Raw length-prefixed byte blob (used for BODY / END-OF-BODY).
    Bytes(Vec<u8>),
    /// Single byte.
    Byte(u8),
    /// Big-endian 32-bit word.
    Word(u32),
}

impl HeaderValue {
    fn encoding(&self) -> Encoding {
        match self {
            HeaderValue::Utf16(_) => Encoding::Utf16,
            HeaderValue::ByteString(_) | HeaderValue::Bytes(_) => Encoding::ByteString,
            HeaderValue::Byte(_) => Encoding::Byte,
            HeaderValue::Word(_) => Encoding::Word,
        }
    }
}

/// One header: `{identifier, value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: HeaderId,
    pub value: HeaderValue,
}

impl Header {
    pub fn name(filename: &str) -> Self {
        Header {
            id: HeaderId::Name,
            value: HeaderValue::Utf16(filename.to_string()),
        }
    }

    pub fn length(bytes: u64) -> Self {
        Header {
            id: HeaderId::Length,
            value: HeaderValue::Word(bytes as u32),
        }
    }

    pub fn hostname(name: &str) -> Self {
        Header {
            id: HeaderId::Hostname,
            value: HeaderValue::ByteString(name.to_string()),
        }
    }

    pub fn connection_id(id: u32) -> Self {
        Header {
            id: HeaderId::ConnectionId,
            value: HeaderValue::Word(id),
        }
    }

    /// Size this header would occupy on the wire.
    pub fn encoded_len(&self) -> usize {
        match &self.value {
            HeaderValue::Utf16(s) => 1 + 2 + (s.encode_utf16().count() + 1) * 2,
            HeaderValue::ByteString(s) => 1 + 2 + s.len() + 1,
            HeaderValue::Bytes(b) => 1 + 2 + b.len(),
            HeaderValue::Byte(_) => 1 + 1,
            HeaderValue::Word(_) => 1 + 4,
        }
    }

    /// Append this header's wire encoding to `out`.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        match &self.value {
            HeaderValue::Utf16(s) => {
                let units: Vec<u16> = s.encode_utf16().chain(std::iter::once(0)).collect();
                let total_len = 1 + 2 + units.len() * 2;
                out.push(self.id.id_byte());
                out.extend_from_slice(&(total_len as u16).to_be_bytes());
                for u in units {
                    out.extend_from_slice(&u.to_be_bytes());
                }
            }
            HeaderValue::ByteString(s) => {
                let total_len = 1 + 2 + s.len() + 1;
                out.push(self.id.id_byte());
                out.extend_from_slice(&(total_len as u16).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            HeaderValue::Bytes(b) => {
                let total_len = 1 + 2 + b.len();
                out.push(self.id.id_byte());
                out.extend_from_slice(&(total_len as u16).to_be_bytes());
                out.extend_from_slice(b);
            }
            HeaderValue::Byte(b) => {
                out.push(self.id.id_byte());
                out.push(*b);
            }
            HeaderValue::Word(w) => {
                out.push(self.id.id_byte());
                out.extend_from_slice(&w.to_be_bytes());
            }
        }
    }

    /// Decode one header starting at `buf[0]`. Returns the header and the
    /// number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Header, usize), ProtocolError> {
        if buf.is_empty() {
            return Err(ProtocolError::ShortRead {
                expected: 1,
                got: 0,
            });
        }
        let id_byte = buf[0];
        let encoding = Encoding::from_bits(id_byte >> 6);
        let meaning = id_byte & 0x3F;
        let id = HeaderId::from_meaning(meaning, encoding);

        match encoding {
            Encoding::Utf16 | Encoding::ByteString => {
                if buf.len() < 3 {
                    return Err(ProtocolError::ShortRead {
                        expected: 3,
                        got: buf.len(),
                    });
                }
                let total_len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
                if total_len < 3 || buf.len() < total_len {
                    return Err(ProtocolError::ShortRead {
                        expected: total_len,
                        got: buf.len(),
                    });
                }
                let payload = &buf[3..total_len];
                let value = if encoding == Encoding::Utf16 {
                    if payload.len() % 2 != 0 || payload.len() < 2 {
                        return Err(ProtocolError::Malformed(
                            "utf16 header payload not code-unit aligned".into(),
                        ));
                    }
                    let units: Vec<u16> = payload
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .collect();
                    // Strip the terminating zero code unit, if present.
                    let units = match units.last() {
                        Some(0) => &units[..units.len() - 1],
                        _ => &units[..],
                    };
                    let s = String::from_utf16(units)
                        .map_err(|_| ProtocolError::Malformed("invalid utf-16".into()))?;
                    HeaderValue::Utf16(s)
                } else {
                    // Strip a single trailing NUL, if present (BODY/END-OF-BODY
                    // carry raw bytes, not NUL-terminated text).
                    if matches!(id, HeaderId::Body | HeaderId::EndOfBody) {
                        HeaderValue::Bytes(payload.to_vec())
                    } else {
                        let s = match payload.last() {
                            Some(0) => &payload[..payload.len() - 1],
                            _ => payload,
                        };
                        let s = std::str::from_utf8(s)
                            .map_err(|_| ProtocolError::Malformed("invalid utf-8".into()))?
                            .to_string();
                        HeaderValue::ByteString(s)
                    }
                };
                Ok((Header { id, value }, total_len))
            }
            Encoding::Byte => {
                if buf.len() < 2 {
                    return Err(ProtocolError::ShortRead {
                        expected: 2,
                        got: buf.len(),
                    });
                }
                Ok((
                    Header {
                        id,
                        value: HeaderValue::Byte(buf[1]),
                    },
                    2,
                ))
            }
            Encoding::Word => {
                if buf.len() < 5 {
                    return Err(ProtocolError::ShortRead {
                        expected: 5,
                        got: buf.len(),
                    });
                }
                let w = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
                Ok((
                    Header {
                        id,
                        value: HeaderValue::Word(w),
                    },
                    5,
                ))
            }
        }
    }
}

/// Build the raw BODY / END-OF-BODY header for a chunk of transfer data.
pub fn body_header(chunk: &[u8], is_final: bool) -> Header {
    Header {
        id: if is_final {
            HeaderId::EndOfBody
        } else {
            HeaderId::Body
        },
        value: HeaderValue::Bytes(chunk.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_name_round_trips() {
        let h = Header::name("hello.txt");
        let mut buf = Vec::new();
        h.encode_to(&mut buf);
        let (decoded, consumed) = Header::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.value, HeaderValue::Utf16("hello.txt".to_string()));
    }

    #[test]
    fn length_word_round_trips() {
        let h = Header::length(13);
        let mut buf = Vec::new();
        h.encode_to(&mut buf);
        assert_eq!(buf.len(), 5);
        let (decoded, _) = Header::decode(&buf).unwrap();
        assert_eq!(decoded.value, HeaderValue::Word(13));
    }

    #[test]
    fn hostname_bytestring_round_trips() {
        let h = Header::hostname("my-host");
        let mut buf = Vec::new();
        h.encode_to(&mut buf);
        let (decoded, consumed) = Header::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(
            decoded.value,
            HeaderValue::ByteString("my-host".to_string())
        );
    }

    #[test]
    fn body_header_preserves_raw_bytes() {
        let chunk = vec![0u8, 1, 2, 255, 254];
        let h = body_header(&chunk, false);
        let mut buf = Vec::new();
        h.encode_to(&mut buf);
        let (decoded, consumed) = Header::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.value, HeaderValue::Bytes(chunk));
        assert_eq!(decoded.id, HeaderId::Body);
    }

    #[test]
    fn empty_end_of_body_is_representable() {
        let h = body_header(&[], true);
        let mut buf = Vec::new();
        h.encode_to(&mut buf);
        let (decoded, _) = Header::decode(&buf).unwrap();
        assert_eq!(decoded.id, HeaderId::EndOfBody);
        assert_eq!(decoded.value, HeaderValue::Bytes(vec![]));
    }

    #[test]
    fn short_buffer_is_short_read() {
        let err = Header::decode(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortRead { .. }));
    }
}

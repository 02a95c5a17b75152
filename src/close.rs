//! Close frame bodies and status codes, as defined in
//! [RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4).
//!
//! The body of a close frame is either empty, or a 2-byte big-endian status code optionally
//! followed by a UTF-8 encoded reason. The status codes are partitioned in ranges:
//!
//! - `0-999`: not used.
//! - `1000-2999`: defined by the protocol. Only some values are assigned.
//! - `3000-3999`: reserved for libraries, frameworks and extensions.
//! - `4000-4999`: reserved for private use by applications.
use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::{utf8, ProtocolError};

/// The largest reason that fits next to the status code in a control frame payload.
pub const MAX_REASON_SIZE: usize = 123;

/// Status code carried by a close frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: the purpose for which the connection was established has been fulfilled.
    Normal,
    /// 1001: an endpoint is going away, such as a server going down.
    Away,
    /// 1002: an endpoint is terminating the connection due to a protocol error.
    Protocol,
    /// 1003: an endpoint received a type of data it cannot accept.
    Unsupported,
    /// 1005: no status code was present in the close frame. Never sent on the wire.
    Status,
    /// 1006: the connection was closed without a close frame. Never sent on the wire.
    Abnormal,
    /// 1007: a message contained data inconsistent with its type, such as invalid UTF-8.
    Invalid,
    /// 1008: a message violates the policy of the endpoint.
    Policy,
    /// 1009: a message is too big to process.
    Size,
    /// 1010: the client expected the server to negotiate an extension.
    Extension,
    /// 1011: the server encountered an unexpected condition.
    Error,
    /// 1012: the service is restarting.
    Restart,
    /// 1013: the service is overloaded, try again later.
    Again,
    /// 1014: a gateway received an invalid response from the upstream server.
    Gateway,
    /// 1015: the TLS handshake failed. Never sent on the wire.
    Tls,
    /// Any other code in the protocol range `1000-2999`, including 1004.
    Reserved(u16),
    /// Codes in `3000-3999`, reserved for libraries, frameworks and extensions.
    Library(u16),
    /// Codes in `4000-4999`, reserved for private use.
    Private(u16),
    /// Codes outside of the ranges in use.
    Bad(u16),
}

impl CloseCode {
    /// Returns `true` if the code is outside of the ranges in use (`0-999` and above `4999`).
    pub fn is_not_used(&self) -> bool {
        matches!(self, CloseCode::Bad(_))
    }

    /// Returns `true` if the code lies in the range defined by the protocol (`1000-2999`).
    pub fn is_protocol_spec(&self) -> bool {
        (1000..=2999).contains(&u16::from(*self))
    }

    /// Returns `true` if the code has a meaning assigned by the protocol.
    pub fn is_protocol_defined(&self) -> bool {
        !matches!(
            self,
            CloseCode::Reserved(_) | CloseCode::Library(_) | CloseCode::Private(_) | CloseCode::Bad(_)
        )
    }

    /// Returns `true` for the codes that are defined for local reporting only and must never be
    /// set in a close frame.
    pub fn is_protocol_reserved(&self) -> bool {
        matches!(self, CloseCode::Status | CloseCode::Abnormal | CloseCode::Tls)
    }

    /// Returns `true` for codes in `3000-3999`.
    pub fn is_library(&self) -> bool {
        matches!(self, CloseCode::Library(_))
    }

    /// Returns `true` for codes in `4000-4999`.
    pub fn is_private(&self) -> bool {
        matches!(self, CloseCode::Private(_))
    }

    /// Returns `true` if the code may be carried by a close frame on the wire.
    pub fn is_allowed(&self) -> bool {
        check_code(*self).is_ok()
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::Status,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::Invalid,
            1008 => CloseCode::Policy,
            1009 => CloseCode::Size,
            1010 => CloseCode::Extension,
            1011 => CloseCode::Error,
            1012 => CloseCode::Restart,
            1013 => CloseCode::Again,
            1014 => CloseCode::Gateway,
            1015 => CloseCode::Tls,
            1000..=2999 => CloseCode::Reserved(code),
            3000..=3999 => CloseCode::Library(code),
            4000..=4999 => CloseCode::Private(code),
            _ => CloseCode::Bad(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Gateway => 1014,
            CloseCode::Tls => 1015,
            CloseCode::Reserved(code)
            | CloseCode::Library(code)
            | CloseCode::Private(code)
            | CloseCode::Bad(code) => code,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// The decoded body of a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The status code.
    pub code: CloseCode,
    /// The reason, possibly empty.
    pub reason: String,
}

impl CloseFrame {
    /// Creates a close body from a code and a reason.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Encodes the body as sent on the wire.
    ///
    /// Reasons longer than [`MAX_REASON_SIZE`] bytes are cut at the last character boundary that
    /// fits, so that the body stays within the control frame payload limit.
    pub fn encode(&self) -> BytesMut {
        let mut end = self.reason.len().min(MAX_REASON_SIZE);
        while !self.reason.is_char_boundary(end) {
            end -= 1;
        }

        let mut payload = BytesMut::with_capacity(2 + end);
        payload.put_u16(u16::from(self.code));
        payload.put_slice(&self.reason.as_bytes()[..end]);
        payload
    }

    /// Decodes and validates a close frame payload.
    ///
    /// Returns `Ok(None)` for an empty payload, which is legal and means that the peer sent no
    /// status code.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let Some((code, reason)) = parse_close_frame_data(payload)? else {
            return Ok(None);
        };
        let reason = check_close_frame_data(code, reason)?;
        Ok(Some(Self::new(code, reason)))
    }
}

/// Splits a close frame payload in its status code and its raw, unvalidated reason.
///
/// Returns `Ok(None)` for an empty payload and an error for a 1-byte payload, as the code and the
/// reason are either both absent or the code is complete.
pub fn parse_close_frame_data(payload: &[u8]) -> Result<Option<(CloseCode, &[u8])>, ProtocolError> {
    match payload {
        [] => Ok(None),
        [_] => Err(ProtocolError::CloseFrameTooShort),
        [hi, lo, reason @ ..] => Ok(Some((CloseCode::from(u16::from_be_bytes([*hi, *lo])), reason))),
    }
}

/// Validates a received status code and reason.
///
/// On success returns the reason as a string slice.
pub fn check_close_frame_data(code: CloseCode, reason: &[u8]) -> Result<&str, ProtocolError> {
    check_code(code)?;
    utf8::validate(reason).ok_or(ProtocolError::InvalidUtf8)
}

fn check_code(code: CloseCode) -> Result<(), ProtocolError> {
    let value = u16::from(code);
    if code.is_not_used() {
        Err(ProtocolError::StatusCodeNotInUse(value))
    } else if value == 1004 {
        Err(ProtocolError::StatusCodeNoMeaning(value))
    } else if code.is_protocol_reserved() {
        Err(ProtocolError::StatusCodeReserved(value))
    } else if code.is_protocol_spec() && !code.is_protocol_defined() {
        Err(ProtocolError::StatusCodeUnknown(value))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod close_code_tests {
        use super::*;

        #[test]
        fn test_u16_conversion() {
            for code in 0..=u16::MAX {
                assert_eq!(u16::from(CloseCode::from(code)), code);
            }
        }

        #[test]
        fn test_ranges() {
            assert!(CloseCode::from(999).is_not_used());
            assert!(CloseCode::from(5000).is_not_used());
            assert!(!CloseCode::from(1000).is_not_used());

            assert!(CloseCode::from(1000).is_protocol_spec());
            assert!(CloseCode::from(2999).is_protocol_spec());
            assert!(!CloseCode::from(3000).is_protocol_spec());

            assert!(CloseCode::from(3000).is_library());
            assert!(CloseCode::from(3999).is_library());
            assert!(CloseCode::from(4000).is_private());
            assert!(CloseCode::from(4999).is_private());
        }

        #[test]
        fn test_defined_and_reserved() {
            assert!(CloseCode::Normal.is_protocol_defined());
            assert!(CloseCode::Status.is_protocol_defined());
            assert!(!CloseCode::from(1004).is_protocol_defined());
            assert!(!CloseCode::from(1016).is_protocol_defined());

            assert!(CloseCode::Status.is_protocol_reserved());
            assert!(CloseCode::Abnormal.is_protocol_reserved());
            assert!(CloseCode::Tls.is_protocol_reserved());
            assert!(!CloseCode::Away.is_protocol_reserved());
        }

        #[test]
        fn test_is_allowed() {
            for code in [1000, 1001, 1002, 1003, 1007, 1011, 1014, 3000, 3999, 4000, 4999] {
                assert!(CloseCode::from(code).is_allowed(), "{code}");
            }
            for code in [0, 999, 1004, 1005, 1006, 1015, 1016, 1100, 2000, 2999, 5000, 65535] {
                assert!(!CloseCode::from(code).is_allowed(), "{code}");
            }
        }
    }

    mod close_frame_tests {
        use super::*;

        #[test]
        fn test_encode() {
            let body = CloseFrame::new(CloseCode::Away, "bye").encode();
            assert_eq!(&body[..], b"\x03\xe9bye");
        }

        #[test]
        fn test_encode_truncates_reason_on_char_boundary() {
            // 2-byte characters, 62 of them are 124 bytes
            let reason = "Ё".repeat(62);
            let body = CloseFrame::new(CloseCode::Normal, reason).encode();

            assert_eq!(body.len(), 2 + 122);
            assert!(std::str::from_utf8(&body[2..]).is_ok());
        }

        #[test]
        fn test_decode() {
            assert_eq!(CloseFrame::decode(b""), Ok(None));
            assert_eq!(
                CloseFrame::decode(b"\x03\xe8"),
                Ok(Some(CloseFrame::new(CloseCode::Normal, "")))
            );
            assert_eq!(
                CloseFrame::decode(b"\x03\xe9goodbye!"),
                Ok(Some(CloseFrame::new(CloseCode::Away, "goodbye!")))
            );
        }

        #[test]
        fn test_decode_errors() {
            assert_eq!(
                CloseFrame::decode(b"\x03"),
                Err(ProtocolError::CloseFrameTooShort)
            );
            assert_eq!(
                CloseFrame::decode(&999u16.to_be_bytes()),
                Err(ProtocolError::StatusCodeNotInUse(999))
            );
            assert_eq!(
                CloseFrame::decode(&1004u16.to_be_bytes()),
                Err(ProtocolError::StatusCodeNoMeaning(1004))
            );
            assert_eq!(
                CloseFrame::decode(&1005u16.to_be_bytes()),
                Err(ProtocolError::StatusCodeReserved(1005))
            );
            assert_eq!(
                CloseFrame::decode(&2000u16.to_be_bytes()),
                Err(ProtocolError::StatusCodeUnknown(2000))
            );
            assert_eq!(
                CloseFrame::decode(b"\x03\xe8\x00\xc8"),
                Err(ProtocolError::InvalidUtf8)
            );
        }
    }
}

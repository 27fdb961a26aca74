//! Length-prefixed MAC transcripts.
//!
//! Every MAC and attestation in the protocol is computed over a byte string
//! assembled field by field. The encoding is fixed:
//!
//! | Field  | Encoding                                   |
//! |--------|--------------------------------------------|
//! | array  | u16 big-endian length, then the bytes      |
//! | string | UTF-8 bytes as an array                    |
//! | blob   | u32 big-endian length, then the bytes      |
//! | bool   | one byte, 0x01 or 0x00                     |
//! | byte   | one byte                                   |
//! | short  | u16 big-endian                             |
//! | int    | i32 big-endian                             |

use super::server_crypto::ServerCryptoInterface;
use crate::error::{ErrorCode, JcsResult};

/// Builder for MAC transcripts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    buffer: Vec<u8>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a short-length-prefixed byte array.
    pub fn add_array(&mut self, data: &[u8]) -> JcsResult<()> {
        let len = u16::try_from(data.len()).map_err(|_| {
            ErrorCode::E208_InvalidValue(
                "array".to_string(),
                format!("{} bytes exceeds 65535", data.len()),
            )
        })?;
        self.add_short(len);
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Append a UTF-8 string as an array.
    pub fn add_string(&mut self, value: &str) -> JcsResult<()> {
        self.add_array(value.as_bytes())
    }

    /// Append an int-length-prefixed byte array.
    pub fn add_blob(&mut self, data: &[u8]) -> JcsResult<()> {
        let len = u32::try_from(data.len()).map_err(|_| {
            ErrorCode::E208_InvalidValue("blob".to_string(), "too large".to_string())
        })?;
        self.buffer.extend_from_slice(&len.to_be_bytes());
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Append a boolean.
    pub fn add_bool(&mut self, flag: bool) {
        self.buffer.push(u8::from(flag));
    }

    /// Append a single byte.
    pub fn add_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Append a 16-bit value.
    pub fn add_short(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a 32-bit value.
    pub fn add_int(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume into the transcript bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Sequenced MAC capability handed to request writers.
///
/// Every call consumes one value of the session's 16-bit sequence counter;
/// counters are never reused.
pub trait MacContext {
    /// MAC `data` under `method` followed by the next counter value.
    fn mac(&mut self, data: &[u8], method: &[u8]) -> JcsResult<Vec<u8>>;

    /// Take the next counter value without computing a MAC.
    fn reserve_counter(&mut self) -> JcsResult<[u8; 2]>;

    /// Encrypt under the session key.
    fn encrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>>;
}

/// [`MacContext`] over the session's crypto and counter.
pub(crate) struct SessionMac<'a> {
    pub(crate) crypto: &'a dyn ServerCryptoInterface,
    pub(crate) counter: &'a mut u16,
}

/// Post-increment the counter.
///
/// 0xFFFF is never issued: it marks the counter as exhausted, so a session
/// gets 65535 MAC operations (0x0000 through 0xFFFE) and never reuses a value.
pub(crate) fn next_counter(counter: &mut u16) -> JcsResult<[u8; 2]> {
    let current = *counter;
    *counter = current.checked_add(1).ok_or_else(|| {
        ErrorCode::E500_ProtocolState("MAC sequence counter exhausted".to_string())
    })?;
    Ok(current.to_be_bytes())
}

impl MacContext for SessionMac<'_> {
    fn mac(&mut self, data: &[u8], method: &[u8]) -> JcsResult<Vec<u8>> {
        let counter = next_counter(self.counter)?;
        let mut modifier = method.to_vec();
        modifier.extend_from_slice(&counter);
        self.crypto.mac(data, &modifier)
    }

    fn reserve_counter(&mut self) -> JcsResult<[u8; 2]> {
        next_counter(self.counter)
    }

    fn encrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>> {
        self.crypto.encrypt(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_encoding() {
        let mut t = Transcript::new();
        t.add_string("id").unwrap();
        t.add_bool(true);
        t.add_byte(7);
        t.add_short(0x0102);
        t.add_int(-1);
        t.add_blob(b"xy").unwrap();
        assert_eq!(
            t.into_bytes(),
            vec![
                0, 2, b'i', b'd', 1, 7, 1, 2, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2, b'x', b'y'
            ]
        );
    }

    #[test]
    fn test_array_too_long() {
        let mut t = Transcript::new();
        assert!(matches!(
            t.add_array(&vec![0u8; 65536]),
            Err(ErrorCode::E208_InvalidValue(..))
        ));
        assert!(t.add_array(&vec![0u8; 65535]).is_ok());
    }

    #[test]
    fn test_counter_post_increments_and_never_wraps() {
        let mut counter = 0u16;
        assert_eq!(next_counter(&mut counter).unwrap(), [0, 0]);
        assert_eq!(next_counter(&mut counter).unwrap(), [0, 1]);
        assert_eq!(counter, 2);

        let mut counter = u16::MAX - 1;
        assert_eq!(next_counter(&mut counter).unwrap(), [0xFF, 0xFE]);
        assert_eq!(counter, u16::MAX);

        let mut counter = u16::MAX;
        assert!(matches!(
            next_counter(&mut counter),
            Err(ErrorCode::E500_ProtocolState(_))
        ));
        assert_eq!(counter, u16::MAX);
    }
}

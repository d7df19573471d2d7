//! Base64-backed byte sequences.
//!
//! Byte fields travel on the wire as base64 strings. [`ByteData`] keeps the base64 text as
//! the canonical representation and decodes to raw bytes lazily, memoizing the result, so a
//! message that never reads a byte field never pays for the decode. Equality is by base64
//! string, matching the wire form.

use std::cell::OnceCell;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct ByteData {
    b64: String,
    decoded: OnceCell<Vec<u8>>,
}

impl ByteData {
    /// Wrap raw bytes, encoding them to the canonical base64 form.
    pub fn from_bytes(bytes: &[u8]) -> ByteData {
        let data = ByteData {
            b64: STANDARD.encode(bytes),
            decoded: OnceCell::new(),
        };
        let _ = data.decoded.set(bytes.to_vec());
        data
    }

    /// Wrap a base64 string, validating it decodes.
    pub fn from_base64(b64: &str) -> Result<ByteData> {
        let decoded = STANDARD
            .decode(b64)
            .map_err(|_| Error::BadValue {
                expected: "base64 bytes",
                actual: format!("{:?}", b64),
            })?;
        let data = ByteData {
            b64: b64.to_string(),
            decoded: OnceCell::new(),
        };
        let _ = data.decoded.set(decoded);
        Ok(data)
    }

    /// Wrap a base64 string without validating it. The decode is deferred to the first
    /// [`as_bytes`][ByteData::as_bytes] call.
    pub fn from_base64_lazy(b64: String) -> ByteData {
        ByteData {
            b64,
            decoded: OnceCell::new(),
        }
    }

    /// The canonical base64 form.
    pub fn to_base64(&self) -> &str {
        &self.b64
    }

    /// The decoded byte sequence. Decoded on first use and memoized.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded);
        }
        let decoded = STANDARD.decode(&self.b64).map_err(|_| Error::BadValue {
            expected: "base64 bytes",
            actual: format!("{:?}", self.b64),
        })?;
        Ok(self.decoded.get_or_init(|| decoded))
    }

    pub fn is_empty(&self) -> bool {
        self.b64.is_empty()
    }
}

impl PartialEq for ByteData {
    fn eq(&self, other: &ByteData) -> bool {
        self.b64 == other.b64
    }
}

impl Eq for ByteData {}

impl fmt::Debug for ByteData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ByteData({})", self.b64)
    }
}

impl From<&[u8]> for ByteData {
    fn from(bytes: &[u8]) -> Self {
        ByteData::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for ByteData {
    fn from(bytes: Vec<u8>) -> Self {
        ByteData::from_bytes(&bytes)
    }
}

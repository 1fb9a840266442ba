//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written with `to_vec_named` (map with field names), so
//! a worker written in another language can read packed bodies by key.
//!
//! # Example
//!
//! ```
//! use mdp_peer::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Resize {
//!     width: u32,
//!     height: u32,
//! }
//!
//! let job = Resize { width: 640, height: 480 };
//! let encoded = MsgPackCodec::encode(&job).unwrap();
//! let decoded: Resize = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, job);
//! ```

use crate::error::Result;

/// MessagePack codec for structured bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Quote {
        symbol: String,
        price: f64,
        live: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Quote {
            symbol: "ACME".to_string(),
            price: 12.5,
            live: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Quote = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_is_written_as_map() {
        let quote = Quote {
            symbol: "X".to_string(),
            price: 0.0,
            live: false,
        };

        let encoded = MsgPackCodec::encode(&quote).unwrap();

        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_none_is_nil() {
        let val: Option<u32> = None;
        let encoded = MsgPackCodec::encode(&val).unwrap();
        assert_eq!(encoded, vec![0xc0]);

        let decoded: Option<u32> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Quote> = MsgPackCodec::decode(b"\xc1 reserved marker");
        assert!(result.is_err());
    }
}

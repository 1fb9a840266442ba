//! Request and reply bodies.
//!
//! The body is the only frame whose decoding is configurable: with
//! [`BodyEncoding::Text`] it is surfaced as a (lossy) UTF-8 string, with
//! [`BodyEncoding::Binary`] the raw bytes are passed through untouched.
//!
//! # Example
//!
//! ```
//! use mdp_peer::protocol::{Body, BodyEncoding};
//! use bytes::Bytes;
//!
//! let body = Body::decode(Bytes::from_static(b"hello"), BodyEncoding::Text);
//! assert_eq!(body.as_text(), Some("hello"));
//! assert_eq!(body, "hello");
//! ```

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// How inbound body frames are surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Decode to a `String` (invalid UTF-8 is replaced).
    #[default]
    Text,
    /// Keep the raw frame bytes.
    Binary,
}

/// A request or reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
}

impl Body {
    /// Decode a received body frame.
    pub fn decode(frame: Bytes, encoding: BodyEncoding) -> Self {
        match encoding {
            BodyEncoding::Text => Body::Text(String::from_utf8_lossy(&frame).into_owned()),
            BodyEncoding::Binary => Body::Binary(frame),
        }
    }

    /// Serialize a value into a binary MsgPack body.
    pub fn pack<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Body::Binary(Bytes::from(MsgPackCodec::encode(value)?)))
    }

    /// Deserialize a MsgPack body.
    ///
    /// Only meaningful for bodies received with [`BodyEncoding::Binary`];
    /// text decoding may already have replaced bytes.
    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(self.as_bytes())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(bytes) => bytes,
        }
    }

    /// Borrow as `&str` if the body is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Body::Text(text) => Cow::Borrowed(text),
            Body::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Convert into a frame.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Body::Text(text) => Bytes::from(text),
            Body::Binary(bytes) => bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text_lossy())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Binary(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl PartialEq<str> for Body {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Body {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

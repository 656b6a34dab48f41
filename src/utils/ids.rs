//! External identifier encoding
//!
//! Albums, images and tokens are 64-bit integers internally. Outside the
//! service they travel as base64url of the 8 little-endian bytes with no
//! padding, which is always 11 characters long.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Length of an encoded identifier
pub const ENCODED_LEN: usize = 11;

/// Encode an identifier for URLs and JSON bodies
///
/// # Examples
/// ```
/// use picrank::utils::ids::{decode, encode};
///
/// let id = encode(42);
/// assert_eq!(id.len(), 11);
/// assert_eq!(decode(&id), Some(42));
/// ```
pub fn encode(id: u64) -> String {
    URL_SAFE_NO_PAD.encode(id.to_le_bytes())
}

/// Decode an identifier, rejecting anything that is not exactly 11
/// base64url characters carrying 8 bytes
pub fn decode(text: &str) -> Option<u64> {
    if text.len() != ENCODED_LEN {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(text).ok()?;
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Object key of an image inside the blob store
pub fn blob_key(album: u64, image: u64) -> String {
    format!("albums/{}/images/{}", encode(album), encode(image))
}

//! Decoding of binary program images
//!
//! An image is a flat sequence of little-endian 16-bit words, loaded verbatim
//! at the start of the memory.

use thiserror::Error;
use tracing::debug;

use crate::constants::{Word, MEMORY_SIZE};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("image has an odd length of {len} bytes")]
    OddLength { len: usize },

    #[error("image has {words} words, more than the {max} words of memory", max = MEMORY_SIZE)]
    TooLarge { words: usize },
}

/// Decode a program image from its raw bytes
///
/// # Errors
///
/// Fails if the image does not contain a whole number of words or if it does
/// not fit in memory.
pub fn decode(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    if bytes.len() % 2 != 0 {
        return Err(ImageError::OddLength { len: bytes.len() });
    }

    let words = bytes.len() / 2;
    if words > MEMORY_SIZE {
        return Err(ImageError::TooLarge { words });
    }

    debug!(words, "Decoding program image");
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| Word::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

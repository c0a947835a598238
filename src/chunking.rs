//! Length-bounded text splitting
//!
//! Text is cut purely by length, measured in Unicode scalar values, so a
//! chunk never ends in the middle of a UTF-8 code point. There is no word or
//! sentence boundary detection.

use crate::error::{Error, Result};

/// Split `text` into consecutive chunks of at most `max_len` characters.
///
/// Every chunk except possibly the last holds exactly `max_len` characters,
/// and concatenating the chunks in order gives back `text`. Empty text yields
/// no chunks.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `max_len` is zero.
pub fn split_text(text: &str, max_len: usize) -> Result<Vec<&str>> {
    if max_len == 0 {
        return Err(Error::InvalidArgument(
            "maximum chunk length must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::with_capacity(text.len() / max_len + 1);
    let mut rest = text;
    while !rest.is_empty() {
        // Byte offset of the (max_len)th char, or the whole remainder
        let cut = rest
            .char_indices()
            .nth(max_len)
            .map_or(rest.len(), |(offset, _)| offset);
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    Ok(chunks)
}

/// Number of chunks [`split_text`] produces: `ceil(chars / max_len)`.
pub fn chunk_count(text: &str, max_len: usize) -> Result<usize> {
    if max_len == 0 {
        return Err(Error::InvalidArgument(
            "maximum chunk length must be greater than zero".to_string(),
        ));
    }
    Ok(text.chars().count().div_ceil(max_len))
}

//! Token cost estimation

/// Bytes of text per model token, on average
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate the inference-token cost of a text
///
/// Deterministic and monotonic in text length; non-empty text never
/// estimates to zero.
///
/// ```
/// use tender_domain::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abc"), 1);
/// assert_eq!(estimate_tokens("abcdefgh"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(BYTES_PER_TOKEN) as u64
}

//! Log-safe rendering of bearer credentials.

/// Tokens shorter than this are fully masked.
const MIN_REVEAL_LEN: usize = 16;
const REVEAL_CHARS: usize = 4;

/// Render a token for logs as `abcd...wxyz`, or `***` when it is too short to
/// reveal anything safely.
#[must_use]
pub fn redact_token(token: &str) -> String {
    let count = token.chars().count();
    if count < MIN_REVEAL_LEN {
        return "***".to_string();
    }
    let head: String = token.chars().take(REVEAL_CHARS).collect();
    let tail: String = token.chars().skip(count - REVEAL_CHARS).collect();
    format!("{head}...{tail}")
}

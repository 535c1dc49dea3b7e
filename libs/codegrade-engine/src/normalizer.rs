//! Output Normalizer
//!
//! **Normalization Rules (identical for actual and expected output):**
//! - Trim leading whitespace: YES
//! - Trim trailing whitespace: YES (covers a trailing `\n` or `\r\n`)
//! - Interior whitespace and newlines: preserved, differences are significant
//! - Case sensitivity: YES (exact match required)
//! - Locale-aware comparison: NO, comparison is exact after trimming

/// Canonical form of a program output for comparison
pub fn normalize(output: &str) -> &str {
    output.trim()
}

/// Whether an actual output matches the expected one after normalization
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}

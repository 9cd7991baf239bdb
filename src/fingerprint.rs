//! Content fingerprint for reviews.
//!
//! A review's identity is its text plus its normalized date. The same
//! fingerprint is written to `Review_RAW.rr_hash` and `Review_CORE.rc_hash`;
//! both columns are UNIQUE, so a review seen again on a later run (or under
//! a different product listing) is rejected at insert time.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::models::format_date;

/// Hex length of a review fingerprint (128 bits).
pub const REVIEW_HASH_LEN: usize = 32;

/// Fingerprint of `text + "|" + date` as 32 lowercase hex characters.
///
/// SHA-256 truncated to its first 16 bytes. Any change to the text,
/// whitespace included, or to the date changes the result.
pub fn review_hash(text: &str, date: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(format_date(date).as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..REVIEW_HASH_LEN / 2])
}

//! Human-readable ticket codes.
//!
//! A ticket code is `prefix + 7 digits + 2 lowercase letters`, for example
//! `BXdep1000042kq`. Codes are re-rendered from stored fields whenever a
//! published review is edited, so encoding must stay deterministic and
//! bit-compatible with codes that were already issued.
//!
//! The hashes are plain polynomial rolling hashes over Unicode scalar values.
//! They are not cryptographic.

use crate::review::ReviewKind;

const BODY_MODULUS: u64 = 10_000_000;
const BODY_FLOOR: u64 = 1_000_000;
const SEED_HASH_BASE: u64 = 33;
const SEED_HASH_MODULUS: u64 = 9_000_000;
const LETTER_HASH_BASE: u64 = 131;
const LETTER_HASH_MODULUS: u64 = 26 * 26;

/// Number of characters after the kind prefix.
pub const TICKET_SUFFIX_LEN: usize = 9;

/// Deterministic ticket code generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketCoder;

impl TicketCoder {
    /// Encodes a ticket code for a review item.
    ///
    /// Never fails and always returns `kind.ticket_prefix().len() + 9`
    /// characters.
    #[must_use]
    pub fn encode(kind: ReviewKind, numeric_seed: i64, request_id: &str) -> String {
        let body = ticket_body(numeric_seed, request_id);
        let letters = ticket_letters(&format!("{}:{numeric_seed}:{request_id}", kind.ticket_tag()));
        let mut out = String::with_capacity(kind.ticket_prefix().len() + TICKET_SUFFIX_LEN);
        out.push_str(kind.ticket_prefix());
        out.push_str(&format!("{body:07}"));
        out.push_str(&letters);
        out
    }

    /// Length of every code produced for `kind`.
    #[must_use]
    pub const fn code_len(kind: ReviewKind) -> usize {
        kind.ticket_prefix().len() + TICKET_SUFFIX_LEN
    }
}

/// Hash of the request id in `[1_000_000, 9_000_000)`.
fn seed_hash(request_id: &str) -> u64 {
    let mut h = 0u64;
    for ch in request_id.chars() {
        h = (h * SEED_HASH_BASE + u64::from(ch)) % SEED_HASH_MODULUS;
    }
    if h < BODY_FLOOR {
        h += BODY_FLOOR;
    }
    h
}

/// Seven-digit numeric body in `[1_000_000, 9_999_999]`.
///
/// Negative seeds use their magnitude. A seed that is zero, or a multiple of
/// ten million, falls back to the request-id hash.
fn ticket_body(numeric_seed: i64, request_id: &str) -> u64 {
    let magnitude = numeric_seed.unsigned_abs();
    let mut v = if magnitude == 0 { seed_hash(request_id) } else { magnitude };
    v %= BODY_MODULUS;
    if v == 0 {
        v = seed_hash(request_id) % BODY_MODULUS;
    }
    if v < BODY_FLOOR {
        v += BODY_FLOOR;
    }
    v
}

fn ticket_letters(seed: &str) -> String {
    let mut h = 0u64;
    for ch in seed.chars() {
        h = (h * LETTER_HASH_BASE + u64::from(ch)) % LETTER_HASH_MODULUS;
    }
    let first = letter((h / 26) % 26);
    let second = letter(h % 26);
    [first, second].iter().collect()
}

fn letter(index: u64) -> char {
    // index < 26 by construction
    char::from(b'a' + u8::try_from(index % 26).unwrap_or(0))
}

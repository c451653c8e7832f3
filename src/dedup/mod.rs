//! Entity identity hashing for duplicate detection
//!
//! Two records that refer to the same company must land on the same hash no
//! matter how the name was typed. Normalization strips diacritics, lowercases
//! and collapses whitespace before hashing.
//!
//! When a tax id is known the hash is derived from it alone (plus the entity
//! kind), so casing and naming variants collapse. Without a tax id the hash
//! falls back to the normalized name plus a discovery nonce, which permits
//! duplicates until a tax id is backfilled. That fallback is a deliberate
//! policy carried over from the source system, not an oversight.

use crate::model::EntityKind;
use crate::taxid::Cnpj;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Normalize a company name for identity comparison:
/// NFD-decompose and drop combining marks, lowercase, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    // Combining Diacritical Marks block covers everything Portuguese
    // company names produce under NFD
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Identity hash for an entity with a known tax id.
/// Deterministic: same kind + tax id always hashes identically.
pub fn identity_hash(kind: EntityKind, cnpj: &Cnpj) -> String {
    digest(&format!("{}|cnpj|{}", kind.as_str(), cnpj.digits()))
}

/// Identity hash for an entity without a tax id: normalized name plus a
/// discovery nonce (enqueue timestamp in millis). Inexact by design.
pub fn fallback_hash(kind: EntityKind, name: &str, nonce_millis: i64) -> String {
    digest(&format!(
        "{}|name|{}|{}",
        kind.as_str(),
        normalize_name(name),
        nonce_millis
    ))
}

/// Hash for kinds that have no tax id at all (markets, products), where the
/// normalized name within a project is the identity.
pub fn named_hash(kind: EntityKind, name: &str) -> String {
    digest(&format!("{}|name|{}", kind.as_str(), normalize_name(name)))
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

//! Schema fingerprints and database naming.
//!
//! Template names are content-addressed: `<base>_<fingerprint>`, where the
//! fingerprint is a truncated SHA-256 of the schema script. Clone names append
//! `_<suffix>` to the template name.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;
/// Hex characters kept from the schema digest.
pub const FINGERPRINT_LEN: usize = 16;
/// Length of `_<suffix>` appended to a template name.
pub const CLONE_SUFFIX_LEN: usize = 13;

/// Content hash of a schema script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw script bytes.
    pub fn of(script: &[u8]) -> Self {
        let digest = Sha256::digest(script);
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the template for a base name and schema fingerprint.
pub fn template_name(base_name: &str, fingerprint: &Fingerprint) -> String {
    format!("{}_{}", base_name, fingerprint)
}

/// Generates clone names for one pool.
///
/// The suffix is 4 hex digits of a per-pool counter followed by 8 hex digits
/// of randomness. The counter keeps names from one pool distinct for 65536
/// consecutive clones; the random part separates concurrent processes.
/// [`create_clone`](crate::clone::create_clone) also retries with a fresh name
/// when the server reports the name as taken.
#[derive(Debug, Default)]
pub struct CloneNamer {
    counter: AtomicU64,
}

impl CloneNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next clone name for `template`.
    pub fn next_name(&self, template: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) & 0xffff;
        let random: u32 = rand::thread_rng().gen();
        format!("{}_{:04x}{:08x}", template, seq, random)
    }
}

/// Quote an identifier for interpolation into DDL.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

/// Whether `name` looks like a clone of `template`.
pub fn is_clone_of(name: &str, template: &str) -> bool {
    name.strip_prefix(template)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|suffix| suffix.len() == CLONE_SUFFIX_LEN - 1 && suffix.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Whether `name` looks like a template for `base_name`.
pub fn is_template_of(name: &str, base_name: &str) -> bool {
    name.strip_prefix(base_name)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|fp| fp.len() == FINGERPRINT_LEN && fp.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

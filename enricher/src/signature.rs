//! Credential-bound request signatures.
//!
//! Providers receive the signature alongside the query and use it to trust
//! the forwarded request without authenticating the caller themselves. The
//! digest covers the caller's token followed by every parameter pair in
//! lexicographic key order, so transports that reorder query parameters do
//! not change it.

use crate::params::NormalizedParameters;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;

/// Lowercase hex SHA-1 digest, 40 characters long.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signs `params` with the caller's token. Returns `None` when there is no token.
pub fn sign(token: Option<&str>, params: &NormalizedParameters) -> Option<Signature> {
    let token = token?;

    let mut hasher = Sha1::new();
    hasher.update(token.as_bytes());
    for (key, value) in params.sorted_pairs() {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }

    Some(Signature(hex::encode(hasher.finalize())))
}

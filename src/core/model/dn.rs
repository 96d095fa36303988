// src/core/model/dn.rs

//! Distinguished names: hierarchical, comma-separated RDN object identifiers.
//!
//! Parent-child containment is implicit in the DN: the parent of
//! `safSu=SU1,safSg=SG1,safApp=App1` is `safSg=SG1,safApp=App1`.

use crate::core::errors::{AmfError, AmfResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNs at or above this length are rejected everywhere (INVALID-PARAM).
pub const MAX_DN_LEN: usize = 256;

/// A validated distinguished name.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Dn(String);

impl Dn {
    /// Creates a DN, enforcing the length bound and non-emptiness.
    pub fn new(s: impl Into<String>) -> AmfResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(AmfError::InvalidParam("empty DN".to_string()));
        }
        if s.len() >= MAX_DN_LEN {
            return Err(AmfError::InvalidParam(format!(
                "DN length {} exceeds maximum {}",
                s.len(),
                MAX_DN_LEN - 1
            )));
        }
        Ok(Dn(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading RDN, e.g. `safSu=SU1` for `safSu=SU1,safSg=SG1`.
    pub fn rdn(&self) -> &str {
        self.0.split(',').next().unwrap_or(&self.0)
    }

    /// The value part of the leading RDN (`SU1` in `safSu=SU1,...`).
    pub fn rdn_value(&self) -> &str {
        let rdn = self.rdn();
        rdn.split_once('=').map(|(_, v)| v).unwrap_or(rdn)
    }

    /// The tag part of the leading RDN (`safSu` in `safSu=SU1,...`).
    pub fn rdn_tag(&self) -> &str {
        let rdn = self.rdn();
        rdn.split_once('=').map(|(t, _)| t).unwrap_or(rdn)
    }

    /// The enclosing object's DN, or `None` for a root object.
    pub fn parent(&self) -> Option<Dn> {
        self.0.split_once(',').map(|(_, rest)| Dn(rest.to_string()))
    }

    /// Number of RDN segments; used to order CCB creates top-down and
    /// deletes bottom-up.
    pub fn depth(&self) -> usize {
        self.0.split(',').count()
    }

    /// True if `self` is contained (directly or transitively) under `other`.
    pub fn is_under(&self, other: &Dn) -> bool {
        self != other && self.0.ends_with(&format!(",{}", other.0))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Dn {
    type Error = AmfError;

    fn try_from(s: &str) -> AmfResult<Self> {
        Dn::new(s)
    }
}

//! Alias resolution: mapping a raw login name to a root and a slot.
//!
//! One grant is shared by up to three concurrent logins: the root name
//! itself and its numbered aliases.
//!
//! ```text
//! "Steve"    → (Steve, slot 0)
//! "Steve-1"  → (Steve, slot 1)
//! "Steve-2"  → (Steve, slot 2)
//! "Steve-3"  → rejected (beyond max_aliases = 2)
//! "Steve-0"  → rejected
//! "Steve-01" → rejected (no leading zeros)
//! ```
//!
//! [`resolve`] is pure and total over its grammar: `confirm_login` and
//! `disconnect` both call it, so they always agree on slot assignment.

use std::fmt;

use portwarden_protocol::RootIdentity;

use crate::AccessError;

/// Index of one login slot under a root. Slot 0 is the root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasSlot(u8);

impl AliasSlot {
    /// The root's own slot.
    pub const ROOT: AliasSlot = AliasSlot(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// The login name that resolves to this slot under `root`.
    pub fn login_name(self, root: &RootIdentity) -> String {
        if self.0 == 0 {
            root.to_string()
        } else {
            format!("{root}-{}", self.0)
        }
    }
}

impl fmt::Display for AliasSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A login name split into its root and slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedIdentity {
    pub root: RootIdentity,
    pub slot: AliasSlot,
}

impl fmt::Display for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slot.login_name(&self.root))
    }
}

/// Resolves `raw` against the grammar `root[-N]`, `1 <= N <= max_aliases`.
///
/// # Errors
/// Returns [`AccessError::InvalidIdentity`] for anything outside the
/// grammar: an invalid root token, a non-numeric suffix, a leading zero,
/// `N = 0` or `N > max_aliases`.
pub fn resolve(raw: &str, max_aliases: u8) -> Result<ResolvedIdentity, AccessError> {
    let invalid = || AccessError::InvalidIdentity(raw.to_string());

    let (root, slot) = match raw.split_once('-') {
        None => (raw, AliasSlot::ROOT),
        Some((root, suffix)) => {
            let well_formed = !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit())
                && !suffix.starts_with('0');
            if !well_formed {
                return Err(invalid());
            }
            let n: u8 = suffix.parse().map_err(|_| invalid())?;
            if n > max_aliases {
                return Err(invalid());
            }
            (root, AliasSlot(n))
        }
    };

    let root = RootIdentity::new(root).map_err(|_| invalid())?;
    Ok(ResolvedIdentity { root, slot })
}

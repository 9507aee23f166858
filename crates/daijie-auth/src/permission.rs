//! Wildcard permissions (`domain:action:instance`).
//!
//! A permission string is split into parts by `:` and each part into
//! sub-parts by `,`. `*` matches anything. Matching is case-insensitive.
//!
//! | granted | requested | implied |
//! |---------|-----------|---------|
//! | `user:*` | `user:delete` | yes |
//! | `user` | `user:read:42` | yes |
//! | `user:read,write` | `user:write` | yes |
//! | `user:read:42` | `user:read` | no |

use std::collections::BTreeSet;
use std::fmt;

use crate::AuthResult;
use crate::error::AuthError;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPermission {
    raw: String,
    parts: Vec<BTreeSet<String>>,
}

impl WildcardPermission {
    /// Parse a permission string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for empty strings or empty parts.
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuthError::configuration("permission string is empty"));
        }

        let mut parts = Vec::new();
        for part in trimmed.split(':') {
            let subparts: BTreeSet<String> = part
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if subparts.is_empty() {
                return Err(AuthError::configuration(format!(
                    "permission '{trimmed}' has an empty part"
                )));
            }
            parts.push(subparts);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            parts,
        })
    }

    /// Returns `true` if holding `self` grants `other`.
    pub fn implies(&self, other: &WildcardPermission) -> bool {
        for (i, other_part) in other.parts.iter().enumerate() {
            // Fewer parts means everything below is granted
            let Some(part) = self.parts.get(i) else {
                return true;
            };
            if !part.contains(WILDCARD) && !other_part.is_subset(part) {
                return false;
            }
        }

        self.parts
            .iter()
            .skip(other.parts.len())
            .all(|part| part.contains(WILDCARD))
    }
}

impl fmt::Display for WildcardPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

//! Filter chain definitions.
//!
//! Maps URL patterns to filter chain rules (`"/admin/**" -> "authc, roles[admin]"`).
//! Patterns are kept in declaration order because the first matching pattern
//! wins when requests are resolved.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::properties::PropertiesLoader;
use crate::{ConfigError, Result};

/// Delimited `pattern=rule` pairs, separated by commas.
pub const FILTER_CHAIN_DEFINITIONS_KEY: &str = "shiro.filterChainDefinitions";

/// JSON object mapping pattern to rule.
pub const FILTER_CHAIN_DEFINITION_MAP_KEY: &str = "shiro.filterChainDefinitionMap";

/// Pattern used when no definitions are configured.
pub const DEFAULT_PATTERN: &str = "*/**";

/// Rule used when no definitions are configured.
pub const DEFAULT_RULE: &str = "anon";

/// Ordered pattern → rule map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterChainDefinitions(IndexMap<String, String>);

impl FilterChainDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fallback map: `{ "*/**": "anon" }`.
    pub fn allow_all() -> Self {
        let mut defs = Self::new();
        defs.insert(DEFAULT_PATTERN, DEFAULT_RULE);
        defs
    }

    /// Resolve definitions from properties.
    ///
    /// `shiro.filterChainDefinitions` takes precedence over
    /// `shiro.filterChainDefinitionMap`; when neither is set the allow-all
    /// map is returned.
    pub fn from_properties(loader: &PropertiesLoader) -> Result<Self> {
        if let Some(raw) = loader.get_property(FILTER_CHAIN_DEFINITIONS_KEY) {
            let defs = Self::parse_delimited(&raw);
            debug!(entries = defs.len(), "Filter chain resolved from delimited definitions");
            return Ok(defs);
        }

        if let Some(raw) = loader.get_property(FILTER_CHAIN_DEFINITION_MAP_KEY) {
            let defs = Self::parse_json(&raw)?;
            debug!(entries = defs.len(), "Filter chain resolved from JSON map");
            return Ok(defs);
        }

        Ok(Self::allow_all())
    }

    /// Parse `pattern=rule,pattern=rule`.
    ///
    /// Pieces without `=` are ignored. Each piece splits at its first `=`.
    pub fn parse_delimited(raw: &str) -> Self {
        let mut defs = Self::new();
        for piece in raw.split(',') {
            if let Some((pattern, rule)) = piece.split_once('=') {
                defs.insert(pattern.trim(), rule.trim());
            }
        }
        defs
    }

    /// Parse a JSON object whose values are rule strings.
    pub fn parse_json(raw: &str) -> Result<Self> {
        let map: IndexMap<String, String> = serde_json::from_str(raw).map_err(|e| {
            ConfigError::parse(format!("{FILTER_CHAIN_DEFINITION_MAP_KEY} is not a string map: {e}"))
        })?;
        Ok(Self(map))
    }

    pub fn insert(&mut self, pattern: impl Into<String>, rule: impl Into<String>) {
        self.0.insert(pattern.into(), rule.into());
    }

    pub fn get(&self, pattern: &str) -> Option<&str> {
        self.0.get(pattern).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split a comma-separated list, ignoring commas inside `[...]` or `"..."`.
///
/// Tokens are trimmed and empty tokens dropped. Quotes are kept so callers
/// can decide whether to strip them.
pub fn split_tokens(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ']' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                push_token(&mut tokens, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_token(&mut tokens, &mut current);
    tokens
}

fn push_token(tokens: &mut Vec<String>, current: &mut String) {
    let token = current.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

/// Remove one pair of surrounding double quotes, if present.
pub fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

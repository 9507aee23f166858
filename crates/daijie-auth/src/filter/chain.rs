//! Chain rules: `name, name[config], ...`.

use daijie_config::chain::{split_tokens, unquote};

use super::ant::AntPathMatcher;
use crate::AuthResult;
use crate::error::AuthError;

/// One filter in a chain rule, with its optional bracketed config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInvocation {
    pub name: String,
    pub config: Vec<String>,
}

impl FilterInvocation {
    /// Parse one token such as `roles[admin,"ops,eu"]`.
    pub fn parse(token: &str) -> AuthResult<Self> {
        let token = token.trim();
        let Some(open) = token.find('[') else {
            if token.is_empty() {
                return Err(AuthError::configuration("empty filter name in chain rule"));
            }
            return Ok(Self {
                name: token.to_string(),
                config: Vec::new(),
            });
        };

        let name = token[..open].trim();
        let inner = token[open + 1..].strip_suffix(']').ok_or_else(|| {
            AuthError::configuration(format!("unterminated '[' in filter '{token}'"))
        })?;
        if name.is_empty() {
            return Err(AuthError::configuration(format!(
                "missing filter name before '[' in '{token}'"
            )));
        }

        let config = split_tokens(inner)
            .iter()
            .map(|value| unquote(value).to_string())
            .collect();

        Ok(Self {
            name: name.to_string(),
            config,
        })
    }
}

/// Parse a whole chain rule into its filters, in order.
pub fn parse_rule(rule: &str) -> AuthResult<Vec<FilterInvocation>> {
    split_tokens(rule)
        .iter()
        .map(|token| FilterInvocation::parse(token))
        .collect()
}

/// A pattern bound to its parsed filters.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub pattern: String,
    pub filters: Vec<FilterInvocation>,
}

/// Ordered pattern-to-filters table. The first matching pattern wins.
#[derive(Debug, Clone, Default)]
pub struct FilterChainResolver {
    matcher: AntPathMatcher,
    entries: Vec<ChainEntry>,
}

impl FilterChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: impl Into<String>, filters: Vec<FilterInvocation>) {
        self.entries.push(ChainEntry {
            pattern: pattern.into(),
            filters,
        });
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn resolve(&self, path: &str) -> Option<&ChainEntry> {
        self.entries
            .iter()
            .find(|entry| self.matcher.matches(&entry.pattern, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        let filters = parse_rule(r#"authc, roles[admin, staff], perms["user:read,write", report:*]"#)
            .unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].name, "authc");
        assert!(filters[0].config.is_empty());
        assert_eq!(filters[1].config, vec!["admin", "staff"]);
        assert_eq!(filters[2].name, "perms");
        assert_eq!(filters[2].config, vec!["user:read,write", "report:*"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(FilterInvocation::parse("roles[admin").is_err());
        assert!(FilterInvocation::parse("[admin]").is_err());
        assert!(parse_rule("").unwrap().is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let mut resolver = FilterChainResolver::new();
        resolver.push("/login", parse_rule("anon").unwrap());
        resolver.push("/admin/**", parse_rule("authc, roles[admin]").unwrap());
        resolver.push("/**", parse_rule("authc").unwrap());

        assert_eq!(resolver.resolve("/login").unwrap().pattern, "/login");
        assert_eq!(resolver.resolve("/admin/users").unwrap().pattern, "/admin/**");
        assert_eq!(resolver.resolve("/reports").unwrap().pattern, "/**");
        assert_eq!(resolver.entries().len(), 3);
    }

    #[test]
    fn test_no_match() {
        let mut resolver = FilterChainResolver::new();
        resolver.push("*/**", parse_rule("anon").unwrap());
        assert!(resolver.resolve("/anything").is_none());
    }
}

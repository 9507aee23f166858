//! Service-specific access filters, installable through `shiro.filterClassNames`.

use async_trait::async_trait;
use daijie_auth::AuthResult;
use daijie_auth::filter::{AccessFilter, FilterContext, FilterOutcome, FilterRegistry, FilterRequest};
use std::sync::Arc;

/// Qualified name of [`AuditFilter`] for `shiro.filterClassNames`.
pub const AUDIT_FILTER: &str = "daijie_server::filters::audit";

/// Built-in filters plus the ones defined here.
pub fn registry() -> FilterRegistry {
    let mut registry = FilterRegistry::with_builtins();
    registry.register(AUDIT_FILTER, || Arc::new(AuditFilter));
    registry
}

/// Logs who reached a path, then lets the request continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditFilter;

#[async_trait]
impl AccessFilter for AuditFilter {
    fn name(&self) -> &str {
        "audit"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        _context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        tracing::info!(
            target: "daijie::audit",
            method = %request.method,
            path = %request.path,
            principal = request.subject.principal.as_deref().unwrap_or("anonymous"),
            tags = ?request.config,
            "Access"
        );
        Ok(FilterOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_audit_and_builtins() {
        let registry = registry();
        assert!(registry.contains(AUDIT_FILTER));
        assert!(registry.contains("daijie_auth::filter::builtin::authc"));

        let (name, filter) = registry.instantiate(AUDIT_FILTER).unwrap();
        assert_eq!(name, "audit");
        assert_eq!(filter.name(), "audit");
    }
}

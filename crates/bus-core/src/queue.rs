//! Queue-name resolver (spec §4.2).
//!
//! A pure, deterministic function of its inputs — no I/O, no state beyond the
//! configured `global_prefix`/`environment`. Mirrors the teacher's
//! `DefaultMessageRouter` (enum-dispatch-ready struct, `from_config`/`new`
//! constructors) generalized from the teacher's fixed `worker_{ns}_queue`
//! naming to the spec's environment/tenant/context/tier-aware scheme.

use crate::error::QueueNameError;
use crate::tier::Tier;
use uuid::Uuid;

/// Default global prefix per spec §4.2.
pub const DEFAULT_GLOBAL_PREFIX: &str = "nooble4";
/// Default environment per spec §4.2.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Builds queue names for the action bus.
///
/// Segment order is fixed per spec §4.2: `service, tenant, context, tier, actions`.
#[derive(Debug, Clone)]
pub struct QueueNameResolver {
    global_prefix: String,
    environment: String,
}

impl Default for QueueNameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_PREFIX, DEFAULT_ENVIRONMENT)
    }
}

impl QueueNameResolver {
    pub fn new(global_prefix: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            global_prefix: global_prefix.into(),
            environment: environment.into(),
        }
    }

    fn base_prefix(&self) -> String {
        format!("{}:{}", self.global_prefix, self.environment)
    }

    /// The `{global_prefix}:{environment}` prefix shared by every queue name
    /// this resolver produces. Exposed so collaborators that namespace other
    /// Redis keys off the same scheme (e.g. `bus-worker`'s task records)
    /// don't have to re-derive it.
    pub fn key_prefix(&self) -> String {
        self.base_prefix()
    }

    /// Replace `:` and whitespace with `_` (spec §4.2 "every interpolated
    /// segment is sanitized").
    pub fn sanitize(part: &str) -> String {
        part.chars()
            .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
            .collect()
    }

    /// Action queue: `{global_prefix}:{environment}:{service}[:{tenant_id}][:{context}][:{tier}]:actions`.
    pub fn action_queue(
        &self,
        service: &str,
        tenant_id: Option<&str>,
        context: Option<&str>,
        tier: Option<Tier>,
    ) -> Result<String, QueueNameError> {
        if service.is_empty() {
            return Err(QueueNameError::Empty { field: "service" });
        }

        let mut parts = vec![self.base_prefix(), Self::sanitize(service)];
        if let Some(tenant_id) = tenant_id.filter(|s| !s.is_empty()) {
            parts.push(Self::sanitize(tenant_id));
        }
        if let Some(context) = context.filter(|s| !s.is_empty()) {
            parts.push(Self::sanitize(context));
        }
        if let Some(tier) = tier {
            parts.push(tier.as_str().to_string());
        }
        parts.push("actions".to_string());
        Ok(parts.join(":"))
    }

    /// Pseudo-sync reply queue: `{global_prefix}:{environment}:{client_service}:responses:{short_action}:{correlation_id}`.
    pub fn reply_queue(
        &self,
        client_service: &str,
        short_action: &str,
        correlation_id: Uuid,
    ) -> Result<String, QueueNameError> {
        if client_service.is_empty() {
            return Err(QueueNameError::Empty {
                field: "client_service",
            });
        }
        if short_action.is_empty() {
            return Err(QueueNameError::Empty {
                field: "short_action",
            });
        }

        Ok(format!(
            "{}:{}:responses:{}:{}",
            self.base_prefix(),
            Self::sanitize(client_service),
            Self::sanitize(short_action),
            correlation_id
        ))
    }

    /// Callback queue: `{global_prefix}:{environment}:{client_service}:callbacks:{context_name}[:{unique_id}]`.
    pub fn callback_queue(
        &self,
        client_service: &str,
        context_name: &str,
        unique_id: Option<&str>,
    ) -> Result<String, QueueNameError> {
        if client_service.is_empty() {
            return Err(QueueNameError::Empty {
                field: "client_service",
            });
        }
        if context_name.is_empty() {
            return Err(QueueNameError::Empty {
                field: "context_name",
            });
        }

        let mut parts = vec![
            self.base_prefix(),
            Self::sanitize(client_service),
            "callbacks".to_string(),
            Self::sanitize(context_name),
        ];
        if let Some(unique_id) = unique_id.filter(|s| !s.is_empty()) {
            parts.push(Self::sanitize(unique_id));
        }
        Ok(parts.join(":"))
    }

    /// Dead-letter queue: `{original_queue}:dead_letter`.
    pub fn dead_letter_queue(original_queue: &str) -> String {
        format!("{original_queue}:dead_letter")
    }

    /// Short form of an `action_type` for use in reply queue names: the last
    /// dot-separated segment, sanitized (§4.3 `send_pseudo_sync`).
    pub fn short_action_type(action_type: &str) -> String {
        let last = action_type.rsplit('.').next().unwrap_or(action_type);
        Self::sanitize(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> QueueNameResolver {
        QueueNameResolver::default()
    }

    #[test]
    fn action_queue_bare_service() {
        assert_eq!(
            resolver().action_queue("management", None, None, None).unwrap(),
            "nooble4:dev:management:actions"
        );
    }

    #[test]
    fn action_queue_with_tenant() {
        assert_eq!(
            resolver()
                .action_queue("embedding", Some("tenant_alpha"), None, None)
                .unwrap(),
            "nooble4:dev:embedding:tenant_alpha:actions"
        );
    }

    #[test]
    fn action_queue_with_context() {
        assert_eq!(
            resolver()
                .action_queue("execution", None, Some("session_xyz123"), None)
                .unwrap(),
            "nooble4:dev:execution:session_xyz123:actions"
        );
    }

    #[test]
    fn action_queue_tenant_before_context_before_tier() {
        assert_eq!(
            resolver()
                .action_queue(
                    "ingestion",
                    Some("t1"),
                    Some("ctx1"),
                    Some(Tier::Enterprise)
                )
                .unwrap(),
            "nooble4:dev:ingestion:t1:ctx1:enterprise:actions"
        );
    }

    #[test]
    fn action_queue_tier_is_last_discriminator_before_actions() {
        let name = resolver()
            .action_queue("svc", None, None, Some(Tier::Free))
            .unwrap();
        assert!(name.ends_with(":free:actions"));
    }

    #[test]
    fn action_queue_rejects_empty_service() {
        assert!(resolver().action_queue("", None, None, None).is_err());
    }

    #[test]
    fn sanitize_replaces_colons_and_whitespace() {
        assert_eq!(QueueNameResolver::sanitize("bad:value here"), "bad_value_here");
    }

    #[test]
    fn reply_queue_shape() {
        let corr = Uuid::nil();
        let name = resolver().reply_queue("svc_a", "message_send", corr).unwrap();
        assert_eq!(
            name,
            format!("nooble4:dev:svc_a:responses:message_send:{corr}")
        );
        assert_eq!(name.matches(":responses:").count(), 1);
    }

    #[test]
    fn callback_queue_with_and_without_unique_id() {
        let r = resolver();
        assert_eq!(
            r.callback_queue("svc_a", "ingested", Some("T1")).unwrap(),
            "nooble4:dev:svc_a:callbacks:ingested:T1"
        );
        assert_eq!(
            r.callback_queue("svc_a", "ingested", None).unwrap(),
            "nooble4:dev:svc_a:callbacks:ingested"
        );
    }

    #[test]
    fn dead_letter_queue_appends_suffix() {
        assert_eq!(
            QueueNameResolver::dead_letter_queue("nooble4:dev:payment:actions"),
            "nooble4:dev:payment:actions:dead_letter"
        );
    }

    #[test]
    fn every_produced_name_starts_with_prefix_and_environment() {
        let r = QueueNameResolver::new("acme", "prod");
        let corr = Uuid::new_v4();
        let names = vec![
            r.action_queue("svc", None, None, None).unwrap(),
            r.reply_queue("svc", "verb", corr).unwrap(),
            r.callback_queue("svc", "ctx", None).unwrap(),
        ];
        for name in names {
            assert!(name.starts_with("acme:prod:"));
        }
    }

    #[test]
    fn short_action_type_takes_last_segment() {
        assert_eq!(
            QueueNameResolver::short_action_type("echo.message.send"),
            "send"
        );
    }

    #[test]
    fn key_prefix_matches_the_prefix_every_queue_name_starts_with() {
        let r = QueueNameResolver::new("acme", "staging");
        assert_eq!(r.key_prefix(), "acme:staging");
        assert!(r.action_queue("svc", None, None, None).unwrap().starts_with(&r.key_prefix()));
    }

    #[test]
    fn custom_prefix_and_environment() {
        let r = QueueNameResolver::new("acme", "staging");
        assert_eq!(
            r.action_queue("svc", None, None, None).unwrap(),
            "acme:staging:svc:actions"
        );
    }
}

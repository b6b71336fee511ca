//! Tenant/tier policy (spec §4.6).
//!
//! Plain, explicitly-constructed lookup tables — no ambient global registry.
//! The original relied on process-wide singletons for tenant config; the
//! teacher's codebase consistently threads configuration through
//! constructors instead (`DefaultMessageRouter::from_config`,
//! `MessagingProvider::new(...)`), and `TierPolicy` follows that shape:
//! built once, then injected by value as `WorkerConfig::policy`. Producers
//! (anything holding a `BusClient`) consult the same table directly rather
//! than the client reading it implicitly.

use crate::tier::Tier;
use std::collections::HashMap;

/// A feature gated behind a subscription tier (spec §4.6 "custom prompts,
/// template types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    CustomPrompts,
    CustomTemplateTypes,
    PriorityRouting,
    ExtendedRetention,
}

/// Per-tier numeric limits consulted by producers and workers.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    /// Upper bound on concurrently in-flight actions for one tenant at this
    /// tier (spec §5 "bounded per-tenant in-flight provides fairness").
    pub max_inflight_per_tenant: u32,
    /// Requests per minute a single session may originate at this tier.
    pub rate_limit_per_session: u32,
    /// Days a worker emitting persistent artifacts (conversations,
    /// analytics) should retain them for tenants at this tier.
    pub retention_days: u32,
}

/// Read-only tables keyed by [`Tier`], injected into clients and workers at
/// construction (spec §4.6 "no ambient global table").
#[derive(Debug, Clone)]
pub struct TierPolicy {
    limits: HashMap<Tier, TierLimits>,
    features: HashMap<Tier, Vec<Feature>>,
}

impl TierPolicy {
    /// Builds a policy from explicit per-tier tables. Any tier missing from
    /// either map falls back to [`Tier`]-appropriate built-in defaults, so a
    /// caller can override only the tiers it cares about.
    pub fn new(limits: HashMap<Tier, TierLimits>, features: HashMap<Tier, Vec<Feature>>) -> Self {
        Self { limits, features }
    }

    fn default_limits(tier: Tier) -> TierLimits {
        match tier {
            Tier::Enterprise => TierLimits {
                max_inflight_per_tenant: 200,
                rate_limit_per_session: 600,
                retention_days: 365,
            },
            Tier::Professional => TierLimits {
                max_inflight_per_tenant: 50,
                rate_limit_per_session: 180,
                retention_days: 90,
            },
            Tier::Advance => TierLimits {
                max_inflight_per_tenant: 20,
                rate_limit_per_session: 60,
                retention_days: 30,
            },
            Tier::Free => TierLimits {
                max_inflight_per_tenant: 5,
                rate_limit_per_session: 20,
                retention_days: 7,
            },
        }
    }

    fn default_features(tier: Tier) -> Vec<Feature> {
        match tier {
            Tier::Enterprise => vec![
                Feature::CustomPrompts,
                Feature::CustomTemplateTypes,
                Feature::PriorityRouting,
                Feature::ExtendedRetention,
            ],
            Tier::Professional => vec![Feature::CustomPrompts, Feature::CustomTemplateTypes],
            Tier::Advance => vec![Feature::CustomPrompts],
            Tier::Free => vec![],
        }
    }

    /// Max concurrently in-flight actions for one tenant at `tier` (spec
    /// §4.6 `max_inflight_per_tenant`).
    pub fn max_inflight_per_tenant(&self, tier: Tier) -> u32 {
        self.limits
            .get(&tier)
            .map(|l| l.max_inflight_per_tenant)
            .unwrap_or_else(|| Self::default_limits(tier).max_inflight_per_tenant)
    }

    /// Requests per minute one session may originate at `tier` (spec §4.6
    /// `rate_limit_per_session`).
    pub fn rate_limit_per_session(&self, tier: Tier) -> u32 {
        self.limits
            .get(&tier)
            .map(|l| l.rate_limit_per_session)
            .unwrap_or_else(|| Self::default_limits(tier).rate_limit_per_session)
    }

    /// Feature flags unlocked at `tier` (spec §4.6 `allowed_features`).
    pub fn allowed_features(&self, tier: Tier) -> &[Feature] {
        self.features
            .get(&tier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `feature` is unlocked at `tier`.
    pub fn has_feature(&self, tier: Tier, feature: Feature) -> bool {
        self.allowed_features(tier).contains(&feature)
    }

    /// Retention window, in days, applied by workers emitting persistent
    /// artifacts at `tier` (spec §4.6 `retention_days`).
    pub fn retention_days(&self, tier: Tier) -> u32 {
        self.limits
            .get(&tier)
            .map(|l| l.retention_days)
            .unwrap_or_else(|| Self::default_limits(tier).retention_days)
    }
}

impl Default for TierPolicy {
    /// The built-in tier table, populated entirely from
    /// [`TierPolicy::default_limits`]/[`TierPolicy::default_features`] for
    /// every known tier. Callers needing different numbers construct their
    /// own via [`TierPolicy::new`] rather than mutating this one.
    fn default() -> Self {
        let limits = Tier::ALL_BY_PRIORITY
            .iter()
            .map(|&tier| (tier, Self::default_limits(tier)))
            .collect();
        let features = Tier::ALL_BY_PRIORITY
            .iter()
            .map(|&tier| (tier, Self::default_features(tier)))
            .collect();
        Self { limits, features }
    }
}

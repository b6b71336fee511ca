//! Subscription tier (spec §3, §4.2 "Tier priority").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription tier attached to every [`crate::envelope::Action`].
///
/// Gates quotas, retention, and delivery priority (§4.6). Ordered here by
/// variant declaration from highest to lowest priority so that
/// `Tier::ALL_BY_PRIORITY` and derived `Ord` (if ever added) stay obviously
/// correct; priority itself is read through [`Tier::priority`], never through
/// enum discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Enterprise,
    Professional,
    Advance,
    Free,
}

impl Tier {
    /// All tiers, enterprise-first — the order a multi-tier consumer MUST
    /// poll in on every cycle (spec §4.2).
    pub const ALL_BY_PRIORITY: [Tier; 4] = [
        Tier::Enterprise,
        Tier::Professional,
        Tier::Advance,
        Tier::Free,
    ];

    /// Numeric priority: 1 = highest (enterprise), 4 = lowest (free).
    pub fn priority(self) -> u8 {
        match self {
            Tier::Enterprise => 1,
            Tier::Professional => 2,
            Tier::Advance => 3,
            Tier::Free => 4,
        }
    }

    /// The wire string used in queue names and JSON (§4.2, §6).
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Advance => "advance",
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Tier::Free),
            "advance" => Some(Tier::Advance),
            "professional" => Some(Tier::Professional),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

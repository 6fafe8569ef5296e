//! Component keys used in gating whitelists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An optional payload component that a whitelist can keep or strip.
///
/// The wire form is the short key the backend sends in the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKey {
    /// Tap breadcrumbs
    #[serde(rename = "br_tb")]
    BreadcrumbsTaps,
    /// View breadcrumbs
    #[serde(rename = "br_vb")]
    BreadcrumbsViews,
    /// Custom view breadcrumbs
    #[serde(rename = "br_cv")]
    BreadcrumbsCustomViews,
    /// Web view breadcrumbs
    #[serde(rename = "br_wv")]
    BreadcrumbsWebViews,
    /// Custom breadcrumbs
    #[serde(rename = "br_cb")]
    BreadcrumbsCustom,
    /// Push notification breadcrumbs
    #[serde(rename = "br_pn")]
    BreadcrumbsPushNotifications,
    /// Session properties (on sessions and events)
    #[serde(rename = "s_props")]
    SessionProperties,
    /// Orientation changes
    #[serde(rename = "s_oc")]
    SessionOrientations,
    /// Moment (event) ids referenced by a session
    #[serde(rename = "s_mts")]
    SessionMoments,
    /// Info log ids referenced by a session
    #[serde(rename = "log_in")]
    LogsInfo,
    /// Warning log ids referenced by a session
    #[serde(rename = "log_war")]
    LogsWarning,
    /// Custom properties attached to an event or log
    #[serde(rename = "log_pr")]
    LogProperties,
    /// User personas
    #[serde(rename = "ur_per")]
    UserPersonas,
    /// ANR intervals
    #[serde(rename = "pr_anr")]
    PerformanceAnr,
    /// Connectivity intervals
    #[serde(rename = "pr_ns")]
    PerformanceConnectivity,
    /// Captured network calls
    #[serde(rename = "pr_nr")]
    PerformanceNetwork,
    /// Disk usage snapshot
    #[serde(rename = "pr_ds")]
    PerformanceDiskUsage,
}

impl ComponentKey {
    pub const ALL: [ComponentKey; 17] = [
        ComponentKey::BreadcrumbsTaps,
        ComponentKey::BreadcrumbsViews,
        ComponentKey::BreadcrumbsCustomViews,
        ComponentKey::BreadcrumbsWebViews,
        ComponentKey::BreadcrumbsCustom,
        ComponentKey::BreadcrumbsPushNotifications,
        ComponentKey::SessionProperties,
        ComponentKey::SessionOrientations,
        ComponentKey::SessionMoments,
        ComponentKey::LogsInfo,
        ComponentKey::LogsWarning,
        ComponentKey::LogProperties,
        ComponentKey::UserPersonas,
        ComponentKey::PerformanceAnr,
        ComponentKey::PerformanceConnectivity,
        ComponentKey::PerformanceNetwork,
        ComponentKey::PerformanceDiskUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKey::BreadcrumbsTaps => "br_tb",
            ComponentKey::BreadcrumbsViews => "br_vb",
            ComponentKey::BreadcrumbsCustomViews => "br_cv",
            ComponentKey::BreadcrumbsWebViews => "br_wv",
            ComponentKey::BreadcrumbsCustom => "br_cb",
            ComponentKey::BreadcrumbsPushNotifications => "br_pn",
            ComponentKey::SessionProperties => "s_props",
            ComponentKey::SessionOrientations => "s_oc",
            ComponentKey::SessionMoments => "s_mts",
            ComponentKey::LogsInfo => "log_in",
            ComponentKey::LogsWarning => "log_war",
            ComponentKey::LogProperties => "log_pr",
            ComponentKey::UserPersonas => "ur_per",
            ComponentKey::PerformanceAnr => "pr_anr",
            ComponentKey::PerformanceConnectivity => "pr_ns",
            ComponentKey::PerformanceNetwork => "pr_nr",
            ComponentKey::PerformanceDiskUsage => "pr_ds",
        }
    }

    /// Parse from the wire key. Unknown keys return `None`; policies may
    /// name components this build does not know about.
    pub fn parse(s: &str) -> Option<Self> {
        ComponentKey::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matches_as_str() {
        for key in ComponentKey::ALL {
            assert_eq!(ComponentKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ComponentKey::parse("br_unknown"), None);
    }

    #[test]
    fn test_serde_uses_wire_key() {
        let json = serde_json::to_string(&ComponentKey::UserPersonas).unwrap();
        assert_eq!(json, "\"ur_per\"");
    }
}

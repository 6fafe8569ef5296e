//! Per-payload sanitizers.
//!
//! Each sanitizer rebuilds the payload keeping an optional component only if
//! its key is in the whitelist. Mandatory fields are copied unconditionally.

use std::collections::BTreeSet;

use crate::payload::{
    Breadcrumbs, EventMessage, PerformanceInfo, SessionMessage, UserInfo,
};
use crate::{ComponentKey, GatingPolicy};

/// A payload the gate knows how to sanitize.
pub trait Gated: Clone {
    /// Whether the policy exempts this payload from gating.
    fn requires_full(&self, policy: &GatingPolicy) -> bool;

    /// Copy of the payload with non-whitelisted components removed.
    fn sanitize(&self, components: &BTreeSet<String>) -> Self;
}

fn keep<T: Clone>(components: &BTreeSet<String>, key: ComponentKey, value: &Option<T>) -> Option<T> {
    if components.contains(key.as_str()) {
        value.clone()
    } else {
        None
    }
}

fn sanitize_user_info(info: &UserInfo, components: &BTreeSet<String>) -> UserInfo {
    UserInfo {
        user_id: info.user_id.clone(),
        username: info.username.clone(),
        email: info.email.clone(),
        personas: keep(components, ComponentKey::UserPersonas, &info.personas),
    }
}

fn sanitize_breadcrumbs(crumbs: &Breadcrumbs, components: &BTreeSet<String>) -> Breadcrumbs {
    Breadcrumbs {
        taps: keep(components, ComponentKey::BreadcrumbsTaps, &crumbs.taps),
        views: keep(components, ComponentKey::BreadcrumbsViews, &crumbs.views),
        custom_views: keep(
            components,
            ComponentKey::BreadcrumbsCustomViews,
            &crumbs.custom_views,
        ),
        web_views: keep(components, ComponentKey::BreadcrumbsWebViews, &crumbs.web_views),
        custom: keep(components, ComponentKey::BreadcrumbsCustom, &crumbs.custom),
        push_notifications: keep(
            components,
            ComponentKey::BreadcrumbsPushNotifications,
            &crumbs.push_notifications,
        ),
    }
}

fn sanitize_performance(perf: &PerformanceInfo, components: &BTreeSet<String>) -> PerformanceInfo {
    PerformanceInfo {
        anr_intervals: keep(components, ComponentKey::PerformanceAnr, &perf.anr_intervals),
        connectivity_intervals: keep(
            components,
            ComponentKey::PerformanceConnectivity,
            &perf.connectivity_intervals,
        ),
        network_calls: keep(components, ComponentKey::PerformanceNetwork, &perf.network_calls),
        disk_usage: keep(components, ComponentKey::PerformanceDiskUsage, &perf.disk_usage),
    }
}

impl Gated for SessionMessage {
    fn requires_full(&self, policy: &GatingPolicy) -> bool {
        if self.session.crash_report_id.is_some() {
            return true;
        }
        self.session.has_error_logs() && policy.send_full_for_error_log()
    }

    fn sanitize(&self, components: &BTreeSet<String>) -> Self {
        let s = &self.session;
        let mut session = s.clone();
        session.properties = keep(components, ComponentKey::SessionProperties, &s.properties);
        session.orientations = keep(components, ComponentKey::SessionOrientations, &s.orientations);
        session.moment_ids = keep(components, ComponentKey::SessionMoments, &s.moment_ids);
        session.info_log_ids = keep(components, ComponentKey::LogsInfo, &s.info_log_ids);
        session.warning_log_ids = keep(components, ComponentKey::LogsWarning, &s.warning_log_ids);

        SessionMessage {
            session,
            user_info: self
                .user_info
                .as_ref()
                .map(|u| sanitize_user_info(u, components)),
            breadcrumbs: self
                .breadcrumbs
                .as_ref()
                .map(|b| sanitize_breadcrumbs(b, components)),
            performance_info: self
                .performance_info
                .as_ref()
                .map(|p| sanitize_performance(p, components)),
            spans: self.spans.clone(),
        }
    }
}

impl Gated for EventMessage {
    fn requires_full(&self, policy: &GatingPolicy) -> bool {
        policy.should_send_full_message(self)
    }

    fn sanitize(&self, components: &BTreeSet<String>) -> Self {
        let e = &self.event;
        let mut event = e.clone();
        event.custom_properties = keep(components, ComponentKey::LogProperties, &e.custom_properties);
        event.session_properties =
            keep(components, ComponentKey::SessionProperties, &e.session_properties);

        EventMessage {
            event,
            user_info: self
                .user_info
                .as_ref()
                .map(|u| sanitize_user_info(u, components)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Breadcrumb, DiskUsage, Event, EventType, Session};

    fn components(keys: &[ComponentKey]) -> BTreeSet<String> {
        keys.iter().map(|k| k.as_str().to_string()).collect()
    }

    #[test]
    fn test_breadcrumbs_kept_per_type() {
        let mut message = SessionMessage::new(Session::new("s", 0));
        message.breadcrumbs = Some(Breadcrumbs {
            taps: Some(vec![Breadcrumb::default()]),
            views: Some(vec![Breadcrumb::default()]),
            ..Default::default()
        });
        let out = message.sanitize(&components(&[ComponentKey::BreadcrumbsTaps]));
        let crumbs = out.breadcrumbs.unwrap();
        assert!(crumbs.taps.is_some());
        assert!(crumbs.views.is_none());
    }

    #[test]
    fn test_disk_usage_stripped_without_key() {
        let mut message = SessionMessage::new(Session::new("s", 0));
        message.performance_info = Some(PerformanceInfo {
            disk_usage: Some(DiskUsage {
                app_disk_usage: 10,
                device_disk_free: None,
            }),
            ..Default::default()
        });
        let out = message.sanitize(&BTreeSet::new());
        assert!(out.performance_info.unwrap().disk_usage.is_none());

        let out = message.sanitize(&components(&[ComponentKey::PerformanceDiskUsage]));
        assert!(out.performance_info.unwrap().disk_usage.is_some());
    }

    #[test]
    fn test_event_keeps_mandatory_fields() {
        let mut event = Event::new("e1", "purchase", EventType::InfoLog, 42);
        event.session_id = Some("s".into());
        event.custom_properties = Some([("k".to_string(), serde_json::json!(1))].into());
        let message = EventMessage::new(event);

        let out = message.sanitize(&BTreeSet::new());
        assert_eq!(out.event.event_id, "e1");
        assert_eq!(out.event.session_id.as_deref(), Some("s"));
        assert!(out.event.custom_properties.is_none());
    }

    #[test]
    fn test_user_identity_is_mandatory() {
        let mut message = EventMessage::new(Event::new("e", "n", EventType::Start, 0));
        message.user_info = Some(UserInfo {
            user_id: Some("u1".into()),
            personas: Some(["payer".to_string()].into()),
            ..Default::default()
        });
        let out = message.sanitize(&BTreeSet::new());
        let info = out.user_info.unwrap();
        assert_eq!(info.user_id.as_deref(), Some("u1"));
        assert!(info.personas.is_none());
    }
}

//! Session and event payload models.
//!
//! Optional components are `Option`s so that a stripped component is absent
//! from the serialized JSON rather than present and empty.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A finished (or snapshotted) session plus its optional components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub session: Session,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<Breadcrumbs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_info: Option<PerformanceInfo>,

    /// Completed spans. Never gated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<serde_json::Value>,
}

impl SessionMessage {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            user_info: None,
            breadcrumbs: None,
            performance_info: None,
            spans: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    // Mandatory
    pub session_id: String,
    /// Start time, ms since epoch.
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log_ids: Option<Vec<String>>,

    // Gated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientations: Option<Vec<Interval>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moment_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_log_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_log_ids: Option<Vec<String>>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, start_time: i64) -> Self {
        Self {
            session_id: session_id.into(),
            start_time,
            end_time: None,
            number: 0,
            crash_report_id: None,
            error_log_ids: None,
            properties: None,
            orientations: None,
            moment_ids: None,
            info_log_ids: None,
            warning_log_ids: None,
        }
    }

    pub fn has_error_logs(&self) -> bool {
        self.error_log_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personas: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// ms since epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breadcrumbs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taps: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_views: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_views: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Vec<Breadcrumb>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notifications: Option<Vec<Breadcrumb>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCall {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub app_disk_usage: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_disk_free: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerformanceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anr_intervals: Option<Vec<Interval>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_intervals: Option<Vec<Interval>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_calls: Option<Vec<NetworkCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<DiskUsage>,
}

/// A discrete event or log message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: Event,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            user_info: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    End,
    Crash,
    ErrorLog,
    WarningLog,
    InfoLog,
    NetworkLog,
}

impl EventType {
    pub fn is_log(&self) -> bool {
        matches!(
            self,
            EventType::ErrorLog | EventType::WarningLog | EventType::InfoLog | EventType::NetworkLog
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    // Mandatory
    pub event_id: String,
    pub name: String,
    pub timestamp: i64,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    // Gated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<BTreeMap<String, String>>,
}

impl Event {
    pub fn new(
        event_id: impl Into<String>,
        name: impl Into<String>,
        event_type: EventType,
        timestamp: i64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            name: name.into(),
            timestamp,
            event_type,
            session_id: None,
            custom_properties: None,
            session_properties: None,
        }
    }
}

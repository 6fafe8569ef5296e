//! Gating policy configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::payload::{EventMessage, EventType};
use crate::ComponentKey;

/// Schema version for the gating policy file.
pub const GATING_SCHEMA_VERSION: &str = "1.0.0";

/// Events whose presence forces a full payload despite the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullSessionEvent {
    Crash,
    ErrorLog,
}

/// Gating policy snapshot.
///
/// `components == None` disables gating. `Some(empty)` enables gating and
/// strips every optional component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatingPolicy {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub components: Option<BTreeSet<String>>,

    #[serde(default)]
    pub full_session_events: BTreeSet<FullSessionEvent>,
}

fn default_schema_version() -> String {
    GATING_SCHEMA_VERSION.to_string()
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl GatingPolicy {
    /// Policy with gating disabled.
    pub fn disabled() -> Self {
        Self {
            schema_version: default_schema_version(),
            components: None,
            full_session_events: BTreeSet::new(),
        }
    }

    /// Policy keeping only the named components.
    pub fn whitelist<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema_version: default_schema_version(),
            components: Some(components.into_iter().map(Into::into).collect()),
            full_session_events: BTreeSet::new(),
        }
    }

    /// Whitelist naming every known component.
    pub fn full_whitelist() -> Self {
        Self::whitelist(ComponentKey::ALL.iter().map(|k| k.as_str()))
    }

    pub fn with_full_session_event(mut self, event: FullSessionEvent) -> Self {
        self.full_session_events.insert(event);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.components.is_some()
    }

    pub fn send_full_for_error_log(&self) -> bool {
        self.full_session_events.contains(&FullSessionEvent::ErrorLog)
    }

    pub fn send_full_for_crash(&self) -> bool {
        self.full_session_events.contains(&FullSessionEvent::Crash)
    }

    /// Whether an event message must be delivered without gating.
    pub fn should_send_full_message(&self, message: &EventMessage) -> bool {
        match message.event.event_type {
            EventType::Crash => self.send_full_for_crash(),
            EventType::ErrorLog => self.send_full_for_error_log(),
            _ => false,
        }
    }

    /// Load policy from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let policy: GatingPolicy = serde_json::from_str(&content)?;
        if policy.schema_version != GATING_SCHEMA_VERSION {
            return Err(crate::GateError::PolicyError(format!(
                "unsupported schema version {}",
                policy.schema_version
            )));
        }
        Ok(policy)
    }

    /// Save policy to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Event;

    #[test]
    fn test_null_components_disable_gating() {
        let policy: GatingPolicy = serde_json::from_str("{}").unwrap();
        assert!(!policy.is_enabled());
        let policy: GatingPolicy = serde_json::from_str(r#"{"components":[]}"#).unwrap();
        assert!(policy.is_enabled());
    }

    #[test]
    fn test_full_message_predicates() {
        let policy = GatingPolicy::whitelist(["br_tb"]).with_full_session_event(FullSessionEvent::Crash);
        let crash = EventMessage::new(Event::new("e1", "crash", EventType::Crash, 0));
        let error = EventMessage::new(Event::new("e2", "oops", EventType::ErrorLog, 0));
        assert!(policy.should_send_full_message(&crash));
        assert!(!policy.should_send_full_message(&error));
        assert!(!policy.send_full_for_error_log());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gating.json");
        let policy = GatingPolicy::whitelist(["s_props", "ur_per"])
            .with_full_session_event(FullSessionEvent::ErrorLog);
        policy.save(&path).unwrap();
        assert_eq!(GatingPolicy::load(&path).unwrap(), policy);
    }

    #[test]
    fn test_load_rejects_other_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gating.json");
        std::fs::write(&path, r#"{"schema_version":"2.0.0"}"#).unwrap();
        assert!(matches!(
            GatingPolicy::load(&path),
            Err(crate::GateError::PolicyError(_))
        ));
    }
}

//! The sanitization gate and its policy source.

use std::sync::{Arc, RwLock};

use crate::payload::{EventMessage, SessionMessage};
use crate::sanitize::Gated;
use crate::{GateError, GatingPolicy};

/// Supplies the current gating policy at evaluation time.
pub trait GatingConfigSource: Send + Sync {
    fn gating_policy(&self) -> crate::Result<GatingPolicy>;
}

/// In-memory policy source that can be swapped when remote config changes.
#[derive(Debug, Default)]
pub struct StaticGatingConfig {
    policy: RwLock<GatingPolicy>,
}

impl StaticGatingConfig {
    pub fn new(policy: GatingPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub fn update(&self, policy: GatingPolicy) -> crate::Result<()> {
        let mut current = self
            .policy
            .write()
            .map_err(|e| GateError::PolicyError(format!("lock poisoned: {}", e)))?;
        *current = policy;
        Ok(())
    }
}

impl GatingConfigSource for StaticGatingConfig {
    fn gating_policy(&self) -> crate::Result<GatingPolicy> {
        self.policy
            .read()
            .map(|p| p.clone())
            .map_err(|e| GateError::PolicyError(format!("lock poisoned: {}", e)))
    }
}

/// Applies the gating policy to payloads before they are dispatched.
#[derive(Clone)]
pub struct SanitizationGate {
    source: Arc<dyn GatingConfigSource>,
}

impl std::fmt::Debug for SanitizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizationGate").finish_non_exhaustive()
    }
}

impl SanitizationGate {
    pub fn new(source: Arc<dyn GatingConfigSource>) -> Self {
        Self { source }
    }

    /// Gate with a fixed policy.
    pub fn with_policy(policy: GatingPolicy) -> Self {
        Self::new(Arc::new(StaticGatingConfig::new(policy)))
    }

    /// Pure gating function.
    pub fn apply<P: Gated>(payload: &P, policy: &GatingPolicy) -> P {
        match &policy.components {
            None => payload.clone(),
            Some(_) if payload.requires_full(policy) => payload.clone(),
            Some(components) => payload.sanitize(components),
        }
    }

    pub fn gate_session(&self, message: &SessionMessage) -> SessionMessage {
        self.gate(message, "session")
    }

    pub fn gate_event(&self, message: &EventMessage) -> EventMessage {
        self.gate(message, "event")
    }

    fn gate<P: Gated>(&self, payload: &P, what: &'static str) -> P {
        let policy = match self.source.gating_policy() {
            Ok(policy) => policy,
            Err(e) => {
                // No readable policy means no whitelist, which means no gating.
                tracing::warn!(
                    event = "gate.policy_unavailable",
                    payload = what,
                    error = %e,
                    "gating policy unavailable; passing payload through"
                );
                return payload.clone();
            }
        };
        if policy.is_enabled() {
            tracing::debug!(event = "gate.sanitize", payload = what, "gating enabled");
        }
        Self::apply(payload, &policy)
    }
}

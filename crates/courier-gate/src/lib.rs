//! Payload gating for courier.
//!
//! A remotely supplied [`GatingPolicy`] decides how much of a session or
//! event payload is delivered:
//!
//! - no component whitelist: gating is off, payloads pass unchanged
//! - whitelist present but the payload carries a crash or error-log
//!   reference the policy asks to keep in full: payload passes unchanged
//! - otherwise only whitelisted optional components survive; mandatory
//!   fields (ids, timestamps, crash and error references) always do
//!
//! Gating is a pure function of (payload, policy).
//!
//! ```
//! use courier_gate::{GatingPolicy, SanitizationGate, SessionMessage, Session};
//!
//! let message = SessionMessage::new(Session::new("s-1", 1_700_000_000_000));
//! let policy = GatingPolicy::whitelist(Vec::<String>::new());
//! let gated = SanitizationGate::apply(&message, &policy);
//! assert_eq!(gated.session.session_id, "s-1");
//! ```

pub mod component;
pub mod error;
pub mod gate;
pub mod payload;
pub mod policy;
pub mod sanitize;

pub use component::ComponentKey;
pub use error::{GateError, Result};
pub use gate::{GatingConfigSource, SanitizationGate, StaticGatingConfig};
pub use payload::{
    Breadcrumb, Breadcrumbs, DiskUsage, Event, EventMessage, EventType, Interval, NetworkCall,
    PerformanceInfo, Session, SessionMessage, UserInfo,
};
pub use policy::{FullSessionEvent, GatingPolicy};
pub use sanitize::Gated;

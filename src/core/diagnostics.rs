//! Injected diagnostics sink for recovered faults.
//!
//! Components that swallow an error (a failed simulation, a rejected move,
//! a discarded training step, a failed checkpoint save) report it here
//! instead of to a process-wide handler. Production code passes
//! [`TracingDiagnostics`]; tests pass [`CapturingDiagnostics`] and inspect
//! what was reported.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// How bad a recovered fault was.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Degraded result, work continued.
    Warning,
    /// Work unit abandoned, caller continued.
    Error,
}

/// One reported fault.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub component: String,
    pub message: String,
}

impl DiagnosticEvent {
    pub fn warning(component: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            component: component.to_string(),
            message: message.into(),
        }
    }

    pub fn error(component: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            component: component.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.component, self.message)
    }
}

/// Sink for recovered faults.
pub trait Diagnostics: Send + Sync {
    /// Record one event. Must not fail or block for long.
    fn record(&self, event: DiagnosticEvent);

    /// Convenience for a warning.
    fn warn(&self, component: &str, message: &str) {
        self.record(DiagnosticEvent::warning(component, message));
    }

    /// Convenience for an error.
    fn error(&self, component: &str, message: &str) {
        self.record(DiagnosticEvent::error(component, message));
    }
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match event.severity {
            Severity::Warning => {
                tracing::warn!(component = %event.component, "{}", event.message)
            }
            Severity::Error => {
                tracing::error!(component = %event.component, "{}", event.message)
            }
        }
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CapturingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl CapturingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of events reported by `component`.
    pub fn count(&self, component: &str) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.component == component).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().map(|e| e.is_empty()).unwrap_or(true)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Diagnostics for CapturingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Shared handle used by every component.
pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// Default production sink.
pub fn tracing_diagnostics() -> SharedDiagnostics {
    Arc::new(TracingDiagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_records_in_order() {
        let sink = CapturingDiagnostics::new();
        sink.warn("mcts", "evaluation failed");
        sink.error("training", "non-finite loss");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[1].component, "training");
        assert_eq!(sink.count("mcts"), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_shared_handle_is_object_safe() {
        let capturing = Arc::new(CapturingDiagnostics::new());
        let shared: SharedDiagnostics = capturing.clone();
        shared.warn("match", "fallback move used");
        assert_eq!(capturing.count("match"), 1);
    }

    #[test]
    fn test_display() {
        let event = DiagnosticEvent::warning("league", "save failed");
        assert_eq!(event.to_string(), "[Warning] league: save failed");
    }
}

//! Lifecycle state for one server-backed resource.
//!
//! Every resource the store tracks has the same shape: a status, the last
//! successfully fetched value, and the error of the last failed fetch.
//!
//! Transitions:
//! - `idle → loading → {succeeded, failed}`
//! - `succeeded | failed → loading` (refetch, unbounded)
//!
//! Invariants held by construction (fields are private, all writes go
//! through the mark operations):
//! - `failed ⇒ error.is_some()`, `succeeded ⇒ error.is_none()`
//! - `val` is only replaced on `succeeded`; a failure keeps the stale value.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl ResourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Idle => "idle",
            ResourceStatus::Loading => "loading",
            ResourceStatus::Succeeded => "succeeded",
            ResourceStatus::Failed => "failed",
        }
    }
}

/// A lifecycle transition for a single slice.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceAction<T> {
    Loading,
    Succeeded(T),
    Failed(String),
    /// Drop everything, back to `idle`.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState<T> {
    status: ResourceStatus,
    val: Option<T>,
    error: Option<String>,

    /// Bumped on every transition; selectors memoize on it.
    #[serde(skip)]
    revision: u64,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            status: ResourceStatus::Idle,
            val: None,
            error: None,
            revision: 0,
        }
    }
}

impl<T> ResourceState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn val(&self) -> Option<&T> {
        self.val.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_loading(&self) -> bool {
        self.status == ResourceStatus::Loading
    }

    /// Enter `loading`. Returns `false` (and changes nothing) if a fetch is
    /// already outstanding for this slice.
    pub fn mark_loading(&mut self) -> bool {
        if self.status == ResourceStatus::Loading {
            return false;
        }
        self.status = ResourceStatus::Loading;
        self.error = None;
        self.revision += 1;
        true
    }

    fn warn_if_idle(&self, outcome: ResourceStatus) {
        if self.status == ResourceStatus::Idle {
            warn!("resource {} without a loading phase", outcome.as_str());
        }
    }

    /// Settling straight from `idle` is allowed but logged.
    pub fn mark_succeeded(&mut self, value: T) {
        self.warn_if_idle(ResourceStatus::Succeeded);
        self.status = ResourceStatus::Succeeded;
        self.val = Some(value);
        self.error = None;
        self.revision += 1;
    }

    /// Record a failure. The previously held value is kept so views can show
    /// stale data next to the error.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        let mut message = message.into();
        if message.is_empty() {
            message = "request failed".to_string();
        }
        self.warn_if_idle(ResourceStatus::Failed);
        self.status = ResourceStatus::Failed;
        self.error = Some(message);
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.status = ResourceStatus::Idle;
        self.val = None;
        self.error = None;
        self.revision += 1;
    }

    /// Apply a transition. Returns `false` when the action was a rejected
    /// duplicate `Loading`.
    pub fn apply(&mut self, action: ResourceAction<T>) -> bool {
        match action {
            ResourceAction::Loading => self.mark_loading(),
            ResourceAction::Succeeded(v) => {
                self.mark_succeeded(v);
                true
            }
            ResourceAction::Failed(msg) => {
                self.mark_failed(msg);
                true
            }
            ResourceAction::Clear => {
                self.clear();
                true
            }
        }
    }
}

impl<T: Clone> ResourceState<T> {
    /// Owned snapshot of the current state.
    pub fn read(&self) -> ResourceState<T> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logs_of(f: impl FnOnce()) -> String {
        let buf = Captured::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn settling_from_idle_is_logged_but_applied() {
        let mut s: ResourceState<u32> = ResourceState::new();
        let logs = logs_of(|| s.mark_succeeded(3));
        assert!(logs.contains("resource succeeded without a loading phase"), "{logs}");
        assert_eq!(s.val(), Some(&3));

        let mut f: ResourceState<u32> = ResourceState::new();
        let logs = logs_of(|| f.mark_failed("boom"));
        assert!(logs.contains("resource failed without a loading phase"), "{logs}");
        assert_eq!(f.status(), ResourceStatus::Failed);
    }

    #[test]
    fn settling_after_loading_is_quiet() {
        let mut s: ResourceState<u32> = ResourceState::new();
        let logs = logs_of(|| {
            s.mark_loading();
            s.mark_succeeded(3);
        });
        assert!(!logs.contains("without a loading phase"), "{logs}");
    }

    #[test]
    fn second_loading_is_rejected_until_settled() {
        let mut s: ResourceState<u32> = ResourceState::new();
        assert!(s.mark_loading());
        assert!(!s.mark_loading());
        assert_eq!(s.status(), ResourceStatus::Loading);

        s.mark_succeeded(7);
        assert!(s.mark_loading());
    }

    #[test]
    fn failed_refetch_keeps_previous_value() {
        let mut s: ResourceState<Vec<&str>> = ResourceState::new();
        s.mark_loading();
        s.mark_succeeded(vec!["A", "B"]);

        s.mark_loading();
        s.mark_failed("HTTP 500");

        assert_eq!(s.status(), ResourceStatus::Failed);
        assert_eq!(s.val(), Some(&vec!["A", "B"]));
        assert_eq!(s.error(), Some("HTTP 500"));
    }

    #[test]
    fn loading_clears_previous_error() {
        let mut s: ResourceState<u8> = ResourceState::new();
        s.mark_loading();
        s.mark_failed("boom");
        s.mark_loading();
        assert_eq!(s.error(), None);
    }

    #[test]
    fn empty_failure_message_still_sets_an_error() {
        let mut s: ResourceState<u8> = ResourceState::new();
        s.mark_failed("");
        assert_eq!(s.error(), Some("request failed"));
    }

    #[test]
    fn revision_moves_on_every_applied_transition() {
        let mut s: ResourceState<u8> = ResourceState::new();
        assert_eq!(s.revision(), 0);
        s.apply(ResourceAction::Loading);
        assert_eq!(s.revision(), 1);
        // Rejected duplicate does not count.
        s.apply(ResourceAction::Loading);
        assert_eq!(s.revision(), 1);
        s.apply(ResourceAction::Succeeded(1));
        s.apply(ResourceAction::Clear);
        assert_eq!(s.revision(), 3);
        assert_eq!(s.val(), None);
    }

    fn action_strategy() -> impl Strategy<Value = ResourceAction<u8>> {
        prop_oneof![
            Just(ResourceAction::Loading),
            any::<u8>().prop_map(ResourceAction::Succeeded),
            "[a-z]{0,8}".prop_map(ResourceAction::Failed),
            Just(ResourceAction::Clear),
        ]
    }

    proptest! {
        #[test]
        fn status_and_error_stay_consistent(actions in prop::collection::vec(action_strategy(), 0..64)) {
            let mut s: ResourceState<u8> = ResourceState::new();
            let mut last_success: Option<u8> = None;

            for action in actions {
                match &action {
                    ResourceAction::Succeeded(v) => last_success = Some(*v),
                    ResourceAction::Clear => last_success = None,
                    _ => {}
                }
                s.apply(action);

                match s.status() {
                    ResourceStatus::Failed => prop_assert!(s.error().is_some()),
                    ResourceStatus::Succeeded => prop_assert!(s.error().is_none()),
                    ResourceStatus::Loading | ResourceStatus::Idle => prop_assert!(s.error().is_none()),
                }
                prop_assert_eq!(s.val().copied(), last_success);
            }
        }
    }
}

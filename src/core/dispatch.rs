//! Fetch-and-settle for one resource slice.
//!
//! At most one fetch per [`ResourceKey`] is outstanding at a time: the
//! status check and the `loading` transition happen under one write lock, and
//! a second dispatch for a loading key returns [`DispatchError::InFlight`]
//! without touching the network. Fetches of different keys run independently
//! and may settle in any order.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::api::ApiError;
use crate::resource::{ResourceAction, ResourceStatus};
use crate::store::{reduce, Action, ResourceKey, Store, StoreEvent, StoreState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{0} is already being fetched")]
    InFlight(ResourceKey),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The project this fetch was issued for is no longer selected; the
    /// result was dropped.
    #[error("{0} response arrived for a project that is no longer selected")]
    Superseded(ResourceKey),
}

impl DispatchError {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DispatchError::InFlight(_))
    }
}

/// Message recorded when a fetch future is dropped before it settles.
pub const CANCELLED_MESSAGE: &str = "request cancelled";

/// Marks which `loading` transition a fetch owns, so a late cleanup never
/// touches a newer fetch of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    revision: u64,
}

fn owns(state: &StoreState, key: ResourceKey, ticket: Ticket) -> bool {
    // Project-scoped revisions restart when the selection changes.
    let same_selection =
        !key.is_project_scoped() || state.selected.generation() == ticket.generation;
    state.status(key) == ResourceStatus::Loading
        && state.revision(key) == ticket.revision
        && same_selection
}

fn settle_cancelled<T>(
    state: &mut StoreState,
    key: ResourceKey,
    wrap: fn(ResourceAction<T>) -> Action,
    ticket: Ticket,
) -> Vec<StoreEvent> {
    if !owns(state, key, ticket) {
        return Vec::new();
    }
    reduce(state, wrap(ResourceAction::Failed(CANCELLED_MESSAGE.to_string())))
}

/// Held across the request. Dropped while armed (the fetch future was
/// cancelled), it moves the slice out of `loading` so the key can be
/// fetched again. The stale value is kept.
struct PendingFetch<T: 'static> {
    store: Store,
    key: ResourceKey,
    wrap: fn(ResourceAction<T>) -> Action,
    ticket: Ticket,
    armed: bool,
}

impl<T: 'static> PendingFetch<T> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T: 'static> Drop for PendingFetch<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("{} fetch cancelled before it settled", self.key);

        let (key, wrap, ticket) = (self.key, self.wrap, self.ticket);
        if let Ok(mut state) = self.store.state.try_write() {
            let events = settle_cancelled(&mut state, key, wrap, ticket);
            drop(state);
            self.store.publish(&events);
            return;
        }

        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let events = {
                        let mut state = store.state.write().await;
                        settle_cancelled(&mut state, key, wrap, ticket)
                    };
                    store.publish(&events);
                });
            }
            Err(_) => error!("{} left loading: no runtime to clean up on", key),
        }
    }
}

impl Store {
    /// Run `request` as the fetch for `key`, recording its lifecycle through
    /// `wrap` (one of the [`Action`] slice variants).
    ///
    /// `request` is not polled when the key is already loading, so no request
    /// goes out in that case. Dropping the returned future mid-request fails
    /// the slice with [`CANCELLED_MESSAGE`].
    pub async fn fetch<T, F>(
        &self,
        key: ResourceKey,
        wrap: fn(ResourceAction<T>) -> Action,
        request: F,
    ) -> Result<T, DispatchError>
    where
        T: Clone + 'static,
        F: Future<Output = Result<T, ApiError>>,
    {
        let (ticket, events) = {
            let mut state = self.state.write().await;
            if state.status(key) == ResourceStatus::Loading {
                debug!("{} already in flight; not refetching", key);
                return Err(DispatchError::InFlight(key));
            }
            let events = reduce(&mut state, wrap(ResourceAction::Loading));
            let ticket = Ticket {
                generation: state.selected.generation(),
                revision: state.revision(key),
            };
            (ticket, events)
        };
        self.publish(&events);

        let mut pending = PendingFetch {
            store: self.clone(),
            key,
            wrap,
            ticket,
            armed: true,
        };

        let result = request.await;

        let mut events = Vec::new();
        let outcome = {
            let mut state = self.state.write().await;
            pending.disarm();

            // The status check reports its own outcome.
            if let Err(err) = &result {
                if err.is_network() && key != ResourceKey::SystemInfo {
                    events.extend(reduce(&mut state, Action::Reachability(false)));
                }
            }

            let superseded =
                key.is_project_scoped() && state.selected.generation() != ticket.generation;

            if superseded && self.options.discard_superseded {
                debug!("{} settled after a project switch; dropped", key);
                Err(DispatchError::Superseded(key))
            } else {
                if superseded {
                    debug!("{} settled after a project switch; writing anyway", key);
                }
                match result {
                    Ok(value) => {
                        events.extend(reduce(
                            &mut state,
                            wrap(ResourceAction::Succeeded(value.clone())),
                        ));
                        Ok(value)
                    }
                    Err(err) => {
                        warn!("{} fetch failed: {}", key, err);
                        events.extend(reduce(
                            &mut state,
                            wrap(ResourceAction::Failed(err.user_message())),
                        ));
                        Err(DispatchError::Api(err))
                    }
                }
            }
        };
        self.publish(&events);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use crate::monitor::MonitorEvent;
    use crate::store::{StoreEvent, StoreOptions};
    use crate::testing::MockApi;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_calls(api: &MockApi, n: usize) {
        while api.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn concurrent_fetch_of_same_key_issues_one_request() {
        let api = Arc::new(MockApi::gated());
        api.push("GET /api/projects", Ok(json!({ "projects": [] })));
        let store = Store::new(api.clone(), StoreOptions::default());

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_projects().await }
        });
        wait_for_calls(&api, 1).await;

        let second = store.fetch_projects().await;
        assert_eq!(second, Err(DispatchError::InFlight(ResourceKey::Projects)));

        api.release(1);
        assert_eq!(first.await.unwrap(), Ok(Vec::new()));
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let api = Arc::new(MockApi::gated());
        api.push("GET /api/projects", Ok(json!({ "projects": [] })));
        api.push("GET /api/system/info", Ok(json!({ "info": {} })));
        let store = Store::new(api.clone(), StoreOptions::default());

        let projects = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_projects().await }
        });
        let info = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_system_info().await }
        });
        wait_for_calls(&api, 2).await;
        api.release(2);

        assert!(projects.await.unwrap().is_ok());
        assert!(info.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn failed_refetch_keeps_stale_list() {
        let api = Arc::new(MockApi::new());
        api.push(
            "GET /api/projects",
            Ok(json!({ "projects": [
                { "project_id": "a", "name": "A" },
                { "project_id": "b", "name": "B" },
            ] })),
        );
        api.push(
            "GET /api/projects",
            Err(ApiError::Status {
                status: 500,
                message: "Internal Server Error".into(),
            }),
        );
        let store = Store::new(api, StoreOptions::default());

        store.fetch_projects().await.unwrap();
        let err = store.fetch_projects().await.unwrap_err();
        assert!(matches!(err, DispatchError::Api(ApiError::Status { status: 500, .. })));

        let (status, ids, error) = store
            .read(|s| {
                let ids: Vec<String> = s
                    .projects
                    .val()
                    .map(|v| v.iter().map(|p| p.project_id.clone()).collect())
                    .unwrap_or_default();
                (s.projects.status(), ids, s.projects.error().map(str::to_string))
            })
            .await;
        assert_eq!(status, ResourceStatus::Failed);
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(error.as_deref(), Some("Internal Server Error"));
    }

    #[tokio::test]
    async fn network_failure_on_any_resource_marks_server_offline() {
        let api = Arc::new(MockApi::new());
        let store = Store::new(api, StoreOptions::default());
        let mut rx = store.subscribe();

        // Unscripted route: the mock answers with a network error.
        assert!(store.fetch_projects().await.is_err());

        let mut saw_offline = false;
        while let Ok(ev) = rx.try_recv() {
            if ev == StoreEvent::Reachability(MonitorEvent::WentOffline) {
                saw_offline = true;
            }
        }
        assert!(saw_offline);
        assert_eq!(store.read(|s| s.server.online()).await, Some(false));
    }

    async fn switch_mid_flight(options: StoreOptions) -> (Store, Result<Project, DispatchError>) {
        let api = Arc::new(MockApi::gated());
        api.push(
            "GET /api/projects/a",
            Ok(json!({ "project": { "project_id": "a", "name": "A" } })),
        );
        let store = Store::new(api.clone(), options);
        store.select_project(Some("a")).await;

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_project("a").await }
        });
        wait_for_calls(&api, 1).await;

        store.select_project(Some("b")).await;
        api.release(1);
        let result = pending.await.unwrap();
        (store, result)
    }

    #[tokio::test]
    async fn last_settled_response_wins_by_default() {
        let (store, result) = switch_mid_flight(StoreOptions::default()).await;
        assert!(result.is_ok());
        let (selected, written) = store
            .read(|s| {
                (
                    s.selected.project_id.clone(),
                    s.selected.project.val().map(|p| p.project_id.clone()),
                )
            })
            .await;
        assert_eq!(selected.as_deref(), Some("b"));
        assert_eq!(written.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn superseded_response_is_dropped_when_enabled() {
        let (store, result) = switch_mid_flight(StoreOptions {
            discard_superseded: true,
        })
        .await;
        assert_eq!(result, Err(DispatchError::Superseded(ResourceKey::Project)));
        let status = store.read(|s| s.selected.project.status()).await;
        assert_eq!(status, ResourceStatus::Idle);
    }

    #[tokio::test]
    async fn dropped_fetch_releases_the_key() {
        let api = Arc::new(MockApi::gated());
        api.push(
            "GET /api/projects",
            Ok(json!({ "projects": [{ "project_id": "a", "name": "A" }] })),
        );
        api.push("GET /api/projects", Ok(json!({ "projects": [] })));
        let store = Store::new(api.clone(), StoreOptions::default());

        api.release(1);
        store.fetch_projects().await.unwrap();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), store.fetch_projects()).await;
        assert!(timed_out.is_err());

        let (status, error, kept) = store
            .read(|s| {
                (
                    s.projects.status(),
                    s.projects.error().map(str::to_string),
                    s.projects.val().map(Vec::len),
                )
            })
            .await;
        assert_eq!(status, ResourceStatus::Failed);
        assert_eq!(error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(kept, Some(1));

        api.release(1);
        assert_eq!(store.fetch_projects().await, Ok(Vec::new()));
        assert_eq!(api.calls_to("GET /api/projects"), 3);
    }

    #[test]
    fn cancelled_cleanup_leaves_a_newer_fetch_alone() {
        let mut state = StoreState::default();
        reduce(&mut state, Action::Projects(ResourceAction::Loading));
        let ticket = Ticket {
            generation: state.selected.generation(),
            revision: state.revision(ResourceKey::Projects),
        };
        reduce(&mut state, Action::Projects(ResourceAction::Succeeded(Vec::new())));
        reduce(&mut state, Action::Projects(ResourceAction::Loading));

        let events = settle_cancelled(&mut state, ResourceKey::Projects, Action::Projects, ticket);
        assert!(events.is_empty());
        assert_eq!(state.projects.status(), ResourceStatus::Loading);
    }

    #[test]
    fn cancelled_project_list_survives_a_selection_change() {
        let mut state = StoreState::default();
        reduce(&mut state, Action::Projects(ResourceAction::Loading));
        let ticket = Ticket {
            generation: state.selected.generation(),
            revision: state.revision(ResourceKey::Projects),
        };
        reduce(&mut state, Action::SelectProject(Some("p1".into())));

        settle_cancelled(&mut state, ResourceKey::Projects, Action::Projects, ticket);
        assert_eq!(state.projects.status(), ResourceStatus::Failed);
    }

    #[tokio::test]
    async fn superseded_network_failure_still_marks_offline() {
        // No scripted response: the mock fails with a network error.
        let api = Arc::new(MockApi::gated());
        let store = Store::new(
            api.clone(),
            StoreOptions {
                discard_superseded: true,
            },
        );
        store.select_project(Some("a")).await;

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_project("a").await }
        });
        wait_for_calls(&api, 1).await;
        store.select_project(Some("b")).await;
        api.release(1);

        assert_eq!(
            pending.await.unwrap(),
            Err(DispatchError::Superseded(ResourceKey::Project))
        );
        assert_eq!(store.read(|s| s.server.online()).await, Some(false));
    }
}

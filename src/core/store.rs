//! The process-wide resource store.
//!
//! One [`Store`] is built at startup and cloned into every consumer; clones
//! share the same state. State only changes through [`reduce`], which is run
//! under the write lock, so readers never observe a half-applied transition.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug_span, info, warn};

use crate::api::Api;
use crate::config::ClientConfig;
use crate::models::{Benchmark, LossProfile, Optimization, PerfProfile, Project, SystemInfo};
use crate::monitor::{MonitorEvent, Reachability};
use crate::resource::{ResourceAction, ResourceState, ResourceStatus};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKey {
    Projects,
    Project,
    Optimizations,
    Benchmarks,
    LossProfiles,
    PerfProfiles,
    SystemInfo,
}

impl ResourceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKey::Projects => "projects",
            ResourceKey::Project => "project",
            ResourceKey::Optimizations => "optimizations",
            ResourceKey::Benchmarks => "benchmarks",
            ResourceKey::LossProfiles => "loss_profiles",
            ResourceKey::PerfProfiles => "perf_profiles",
            ResourceKey::SystemInfo => "system_info",
        }
    }

    /// Slices that belong to the currently selected project.
    pub fn is_project_scoped(self) -> bool {
        matches!(
            self,
            ResourceKey::Project
                | ResourceKey::Optimizations
                | ResourceKey::Benchmarks
                | ResourceKey::LossProfiles
                | ResourceKey::PerfProfiles
        )
    }

    pub fn all() -> &'static [ResourceKey] {
        &[
            ResourceKey::Projects,
            ResourceKey::Project,
            ResourceKey::Optimizations,
            ResourceKey::Benchmarks,
            ResourceKey::LossProfiles,
            ResourceKey::PerfProfiles,
            ResourceKey::SystemInfo,
        ]
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything tied to the project in the current route.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectedProject {
    pub project_id: Option<String>,
    pub optim_id: Option<String>,
    pub project: ResourceState<Project>,
    pub optimizations: ResourceState<Vec<Optimization>>,
    pub benchmarks: ResourceState<Vec<Benchmark>>,
    pub loss_profiles: ResourceState<Vec<LossProfile>>,
    pub perf_profiles: ResourceState<Vec<PerfProfile>>,

    /// Incremented every time a different project is selected.
    #[serde(skip)]
    generation: u64,
}

impl SelectedProject {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn replace(&mut self, project_id: Option<String>) {
        let generation = self.generation + 1;
        *self = SelectedProject {
            project_id,
            generation,
            ..SelectedProject::default()
        };
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreState {
    pub projects: ResourceState<Vec<Project>>,
    pub selected: SelectedProject,
    pub system_info: ResourceState<SystemInfo>,
    pub server: Reachability,
}

impl StoreState {
    pub fn status(&self, key: ResourceKey) -> ResourceStatus {
        match key {
            ResourceKey::Projects => self.projects.status(),
            ResourceKey::Project => self.selected.project.status(),
            ResourceKey::Optimizations => self.selected.optimizations.status(),
            ResourceKey::Benchmarks => self.selected.benchmarks.status(),
            ResourceKey::LossProfiles => self.selected.loss_profiles.status(),
            ResourceKey::PerfProfiles => self.selected.perf_profiles.status(),
            ResourceKey::SystemInfo => self.system_info.status(),
        }
    }

    pub fn error(&self, key: ResourceKey) -> Option<&str> {
        match key {
            ResourceKey::Projects => self.projects.error(),
            ResourceKey::Project => self.selected.project.error(),
            ResourceKey::Optimizations => self.selected.optimizations.error(),
            ResourceKey::Benchmarks => self.selected.benchmarks.error(),
            ResourceKey::LossProfiles => self.selected.loss_profiles.error(),
            ResourceKey::PerfProfiles => self.selected.perf_profiles.error(),
            ResourceKey::SystemInfo => self.system_info.error(),
        }
    }

    pub fn revision(&self, key: ResourceKey) -> u64 {
        match key {
            ResourceKey::Projects => self.projects.revision(),
            ResourceKey::Project => self.selected.project.revision(),
            ResourceKey::Optimizations => self.selected.optimizations.revision(),
            ResourceKey::Benchmarks => self.selected.benchmarks.revision(),
            ResourceKey::LossProfiles => self.selected.loss_profiles.revision(),
            ResourceKey::PerfProfiles => self.selected.perf_profiles.revision(),
            ResourceKey::SystemInfo => self.system_info.revision(),
        }
    }
}

/// Every way the store can change.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Projects(ResourceAction<Vec<Project>>),
    Project(ResourceAction<Project>),
    Optimizations(ResourceAction<Vec<Optimization>>),
    Benchmarks(ResourceAction<Vec<Benchmark>>),
    LossProfiles(ResourceAction<Vec<LossProfile>>),
    PerfProfiles(ResourceAction<Vec<PerfProfile>>),
    SystemInfo(ResourceAction<SystemInfo>),
    SelectProject(Option<String>),
    SelectOptimization(Option<String>),
    Reachability(bool),
    DismissDownNotice,
    /// Back to the initial state, keeping only what we know about the server.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Changed(ResourceKey),
    SelectionChanged,
    Reachability(MonitorEvent),
    Reset,
}

fn apply_resource<T>(
    key: ResourceKey,
    slot: &mut ResourceState<T>,
    action: ResourceAction<T>,
    events: &mut Vec<StoreEvent>,
) {
    let _span = debug_span!("resource", key = key.as_str()).entered();
    if slot.apply(action) {
        events.push(StoreEvent::Changed(key));
    }
}

/// Apply `action` to `state`, returning what changed.
pub fn reduce(state: &mut StoreState, action: Action) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    match action {
        Action::Projects(a) => apply_resource(ResourceKey::Projects, &mut state.projects, a, &mut events),
        Action::Project(a) => apply_resource(
            ResourceKey::Project,
            &mut state.selected.project,
            a,
            &mut events,
        ),
        Action::Optimizations(a) => apply_resource(
            ResourceKey::Optimizations,
            &mut state.selected.optimizations,
            a,
            &mut events,
        ),
        Action::Benchmarks(a) => apply_resource(
            ResourceKey::Benchmarks,
            &mut state.selected.benchmarks,
            a,
            &mut events,
        ),
        Action::LossProfiles(a) => apply_resource(
            ResourceKey::LossProfiles,
            &mut state.selected.loss_profiles,
            a,
            &mut events,
        ),
        Action::PerfProfiles(a) => apply_resource(
            ResourceKey::PerfProfiles,
            &mut state.selected.perf_profiles,
            a,
            &mut events,
        ),
        Action::SystemInfo(a) => apply_resource(
            ResourceKey::SystemInfo,
            &mut state.system_info,
            a,
            &mut events,
        ),
        Action::SelectProject(project_id) => {
            if state.selected.project_id != project_id {
                state.selected.replace(project_id);
                events.push(StoreEvent::SelectionChanged);
            }
        }
        Action::SelectOptimization(optim_id) => {
            if state.selected.optim_id != optim_id {
                state.selected.optim_id = optim_id;
                events.push(StoreEvent::SelectionChanged);
            }
        }
        Action::Reachability(online) => {
            events.extend(
                state
                    .server
                    .observe(online)
                    .into_iter()
                    .map(StoreEvent::Reachability),
            );
        }
        Action::DismissDownNotice => state.server.dismiss_down_notice(),
        Action::Reset => {
            // Clear in place so revisions keep increasing for memoized readers.
            state.projects.clear();
            state.system_info.clear();
            state.selected.replace(None);
            events.push(StoreEvent::Reset);
        }
    }
    events
}

/// Knobs that change store behavior rather than transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Drop fetch results that settle after their project was deselected.
    /// Off by default: the last response to settle wins.
    pub discard_superseded: bool,
}

impl From<&ClientConfig> for StoreOptions {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            discard_superseded: cfg.discard_superseded,
        }
    }
}

/// Shared handle to the store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pub(crate) state: Arc<RwLock<StoreState>>,
    pub(crate) api: Arc<dyn Api>,
    pub(crate) options: StoreOptions,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(api: Arc<dyn Api>, options: StoreOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            api,
            options,
            events,
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Change notifications, delivered after the state is updated.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn dispatch(&self, action: Action) -> Vec<StoreEvent> {
        let events = {
            let mut state = self.state.write().await;
            reduce(&mut state, action)
        };
        self.publish(&events);
        events
    }

    pub(crate) fn publish(&self, events: &[StoreEvent]) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event.clone());
        }
    }

    /// Switch the route's project. Selecting a different project discards all
    /// state of the previous one.
    pub async fn select_project(&self, project_id: Option<&str>) {
        self.dispatch(Action::SelectProject(project_id.map(str::to_string)))
            .await;
    }

    pub async fn select_optimization(&self, optim_id: Option<&str>) {
        self.dispatch(Action::SelectOptimization(optim_id.map(str::to_string)))
            .await;
    }

    pub async fn reset(&self) {
        self.dispatch(Action::Reset).await;
    }

    pub(crate) async fn observe_reachability(&self, online: bool) -> Vec<MonitorEvent> {
        self.dispatch(Action::Reachability(online))
            .await
            .into_iter()
            .filter_map(|e| match e {
                StoreEvent::Reachability(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Full resynchronization after the server comes back: reset everything,
    /// then refetch what the current route shows.
    pub async fn handle_reload(&self) {
        let (project_id, optim_id) = self
            .read(|s| (s.selected.project_id.clone(), s.selected.optim_id.clone()))
            .await;
        info!("Reloading store state");

        self.reset().await;
        if let Err(e) = self.fetch_projects().await {
            warn!("Reload: project list fetch failed: {}", e);
        }

        if let Some(id) = project_id {
            self.load_project(&id).await;
            self.select_optimization(optim_id.as_deref()).await;
        }
    }
}

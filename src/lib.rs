//! # sparsify
//!
//! Client-side state for the Sparsify model-optimization workflow: a store
//! that tracks every resource fetched from the Sparsify server (projects,
//! optimizations, benchmarks, profiles, system info), the request lifecycle
//! of each, and whether the server is reachable at all.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sparsify::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ClientConfig::default();
//! let api = Arc::new(HttpApi::from_config(&cfg)?);
//! let store = Store::new(api, StoreOptions::from(&cfg));
//!
//! store.fetch_projects().await?;
//! let mut selectors = Selectors::new();
//! let projects = store.read(|s| selectors.sorted_projects(s)).await;
//! println!("{} projects", projects.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `http` (default): reqwest-backed [`http::HttpApi`]
//!
//! ## Modules
//!
//! - [`resource`]: lifecycle state of a single resource
//! - [`store`]: the shared state container and its actions
//! - [`dispatch`]: in-flight-guarded fetches
//! - [`thunks`]: fetch/mutation operations per API resource
//! - [`selectors`]: pure derivations for views
//! - [`monitor`]: server reachability

#[path = "core/api.rs"]
pub mod api;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/dispatch.rs"]
pub mod dispatch;

#[cfg(feature = "http")]
#[path = "core/http.rs"]
pub mod http;

#[path = "core/models.rs"]
pub mod models;

#[path = "core/monitor.rs"]
pub mod monitor;

#[path = "core/paths.rs"]
pub mod paths;

#[path = "core/prefs.rs"]
pub mod prefs;

#[path = "core/resource.rs"]
pub mod resource;

#[path = "core/selectors.rs"]
pub mod selectors;

#[path = "core/store.rs"]
pub mod store;

#[path = "core/thunks.rs"]
pub mod thunks;

#[cfg(test)]
#[path = "core/testing.rs"]
mod testing;

/// Prelude module for convenient imports.
///
/// ```
/// use sparsify::prelude::*;
/// ```
pub mod prelude {
    pub use crate::api::{Api, ApiError, Method};
    pub use crate::config::ClientConfig;
    pub use crate::dispatch::DispatchError;
    #[cfg(feature = "http")]
    pub use crate::http::HttpApi;
    pub use crate::monitor::{Connectivity, Monitor, MonitorEvent};
    pub use crate::resource::{ResourceAction, ResourceState, ResourceStatus};
    pub use crate::selectors::Selectors;
    pub use crate::store::{Action, ResourceKey, Store, StoreEvent, StoreOptions, StoreState};
}

//! Fetch and mutation thunks for each Sparsify API resource.
//!
//! Fetches go through [`Store::fetch`]. Mutations talk to the API directly and
//! then refetch the list they affect, so list values are only ever replaced by
//! a successful fetch.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiError, Method};
use crate::dispatch::DispatchError;
use crate::models::{
    Benchmark, LossProfile, NewBenchmark, NewOptimization, NewProfile, NewProject, Optimization,
    PerfProfile, Project, ProjectUpdate, SystemInfo,
};
use crate::monitor::MonitorEvent;
use crate::store::{Action, ResourceKey, Store};

#[derive(Deserialize)]
struct ProjectsBody {
    projects: Vec<Project>,
}

#[derive(Deserialize)]
struct ProjectBody {
    project: Project,
}

#[derive(Deserialize)]
struct OptimsBody {
    optims: Vec<Optimization>,
}

#[derive(Deserialize)]
struct OptimBody {
    optim: Optimization,
}

#[derive(Deserialize)]
struct BenchmarksBody {
    benchmarks: Vec<Benchmark>,
}

#[derive(Deserialize)]
struct BenchmarkBody {
    benchmark: Benchmark,
}

#[derive(Deserialize)]
struct ProfilesBody<T> {
    profiles: Vec<T>,
}

#[derive(Deserialize)]
struct ProfileBody<T> {
    profile: T,
}

#[derive(Deserialize)]
struct InfoBody {
    info: SystemInfo,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn to_body<T: serde::Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(format!("encode request: {e}")))
}

fn project_path(project_id: &str) -> String {
    format!("/api/projects/{}", project_id)
}

/// Outcome of one reachability check.
#[derive(Debug)]
pub struct ServerCheck {
    pub result: Result<SystemInfo, DispatchError>,
    pub events: Vec<MonitorEvent>,
}

impl Store {
    async fn get<T: DeserializeOwned>(&self, path: String) -> Result<T, ApiError> {
        let value = self.api.request(Method::Get, &path, None).await?;
        decode(value)
    }

    pub async fn fetch_projects(&self) -> Result<Vec<Project>, DispatchError> {
        let request = async {
            let body: ProjectsBody = self.get("/api/projects".to_string()).await?;
            Ok::<_, ApiError>(body.projects)
        };
        self.fetch(ResourceKey::Projects, Action::Projects, request)
            .await
    }

    pub async fn fetch_project(&self, project_id: &str) -> Result<Project, DispatchError> {
        self.select_project(Some(project_id)).await;
        let request = async {
            let body: ProjectBody = self.get(project_path(project_id)).await?;
            Ok::<_, ApiError>(body.project)
        };
        self.fetch(ResourceKey::Project, Action::Project, request)
            .await
    }

    pub async fn fetch_optimizations(
        &self,
        project_id: &str,
    ) -> Result<Vec<Optimization>, DispatchError> {
        self.select_project(Some(project_id)).await;
        let request = async {
            let body: OptimsBody = self
                .get(format!("{}/optim", project_path(project_id)))
                .await?;
            Ok::<_, ApiError>(body.optims)
        };
        self.fetch(ResourceKey::Optimizations, Action::Optimizations, request)
            .await
    }

    pub async fn fetch_benchmarks(&self, project_id: &str) -> Result<Vec<Benchmark>, DispatchError> {
        self.select_project(Some(project_id)).await;
        let request = async {
            let body: BenchmarksBody = self
                .get(format!("{}/benchmarks", project_path(project_id)))
                .await?;
            Ok::<_, ApiError>(body.benchmarks)
        };
        self.fetch(ResourceKey::Benchmarks, Action::Benchmarks, request)
            .await
    }

    pub async fn fetch_loss_profiles(
        &self,
        project_id: &str,
    ) -> Result<Vec<LossProfile>, DispatchError> {
        self.select_project(Some(project_id)).await;
        let request = async {
            let body: ProfilesBody<LossProfile> = self
                .get(format!("{}/profiles/loss", project_path(project_id)))
                .await?;
            Ok::<_, ApiError>(body.profiles)
        };
        self.fetch(ResourceKey::LossProfiles, Action::LossProfiles, request)
            .await
    }

    pub async fn fetch_perf_profiles(
        &self,
        project_id: &str,
    ) -> Result<Vec<PerfProfile>, DispatchError> {
        self.select_project(Some(project_id)).await;
        let request = async {
            let body: ProfilesBody<PerfProfile> = self
                .get(format!("{}/profiles/perf", project_path(project_id)))
                .await?;
            Ok::<_, ApiError>(body.profiles)
        };
        self.fetch(ResourceKey::PerfProfiles, Action::PerfProfiles, request)
            .await
    }

    /// Select `project_id` and fetch everything its pages show. Returns the
    /// fetches that failed.
    pub async fn load_project(&self, project_id: &str) -> Vec<(ResourceKey, DispatchError)> {
        self.select_project(Some(project_id)).await;
        let (project, optims, benchmarks, loss, perf) = tokio::join!(
            self.fetch_project(project_id),
            self.fetch_optimizations(project_id),
            self.fetch_benchmarks(project_id),
            self.fetch_loss_profiles(project_id),
            self.fetch_perf_profiles(project_id),
        );

        let mut failures = Vec::new();
        if let Err(e) = project {
            failures.push((ResourceKey::Project, e));
        }
        if let Err(e) = optims {
            failures.push((ResourceKey::Optimizations, e));
        }
        if let Err(e) = benchmarks {
            failures.push((ResourceKey::Benchmarks, e));
        }
        if let Err(e) = loss {
            failures.push((ResourceKey::LossProfiles, e));
        }
        if let Err(e) = perf {
            failures.push((ResourceKey::PerfProfiles, e));
        }
        failures
    }

    /// One reachability check: fetch system info and feed the outcome to the
    /// reachability state. Any failure counts as offline. A check skipped
    /// because one is already running reports nothing.
    pub async fn check_server(&self) -> ServerCheck {
        let request = async {
            let body: InfoBody = self.get("/api/system/info".to_string()).await?;
            Ok::<_, ApiError>(body.info)
        };
        let result = self
            .fetch(ResourceKey::SystemInfo, Action::SystemInfo, request)
            .await;

        let events = match &result {
            Err(e) if e.is_in_flight() => Vec::new(),
            Err(DispatchError::Superseded(_)) => Vec::new(),
            Ok(_) => self.observe_reachability(true).await,
            Err(_) => self.observe_reachability(false).await,
        };
        ServerCheck { result, events }
    }

    pub async fn fetch_system_info(&self) -> Result<SystemInfo, DispatchError> {
        self.check_server().await.result
    }

    /// Refetch after a mutation. A fetch already in flight is left alone.
    async fn refresh(&self, key: ResourceKey, project_id: &str) {
        let selected = self
            .read(|s| s.selected.project_id.as_deref() == Some(project_id))
            .await;
        let result = match key {
            ResourceKey::Projects => self.fetch_projects().await.map(|_| ()),
            _ if !selected => return,
            ResourceKey::Project => self.fetch_project(project_id).await.map(|_| ()),
            ResourceKey::Optimizations => self.fetch_optimizations(project_id).await.map(|_| ()),
            ResourceKey::Benchmarks => self.fetch_benchmarks(project_id).await.map(|_| ()),
            ResourceKey::LossProfiles => self.fetch_loss_profiles(project_id).await.map(|_| ()),
            ResourceKey::PerfProfiles => self.fetch_perf_profiles(project_id).await.map(|_| ()),
            ResourceKey::SystemInfo => return,
        };
        if let Err(e) = result {
            debug!("Refresh of {} after mutation: {}", key, e);
        }
    }

    pub async fn create_project(&self, new: &NewProject) -> Result<Project, ApiError> {
        let value = self
            .api
            .request(Method::Post, "/api/projects", Some(to_body(new)?))
            .await?;
        let body: ProjectBody = decode(value)?;
        info!("Created project {} ({})", body.project.name, body.project.project_id);

        self.refresh(ResourceKey::Projects, &body.project.project_id)
            .await;
        Ok(body.project)
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError> {
        let value = self
            .api
            .request(Method::Put, &project_path(project_id), Some(to_body(update)?))
            .await?;
        let body: ProjectBody = decode(value)?;

        self.refresh(ResourceKey::Projects, project_id).await;
        self.refresh(ResourceKey::Project, project_id).await;
        Ok(body.project)
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<(), ApiError> {
        self.api
            .request(Method::Delete, &project_path(project_id), None)
            .await?;
        info!("Deleted project {}", project_id);

        let was_selected = self
            .read(|s| s.selected.project_id.as_deref() == Some(project_id))
            .await;
        if was_selected {
            self.select_project(None).await;
        }
        self.refresh(ResourceKey::Projects, project_id).await;
        Ok(())
    }

    pub async fn create_optimization(
        &self,
        project_id: &str,
        new: &NewOptimization,
    ) -> Result<Optimization, ApiError> {
        let value = self
            .api
            .request(
                Method::Post,
                &format!("{}/optim", project_path(project_id)),
                Some(to_body(new)?),
            )
            .await?;
        let body: OptimBody = decode(value)?;

        self.refresh(ResourceKey::Optimizations, project_id).await;
        Ok(body.optim)
    }

    pub async fn create_benchmark(
        &self,
        project_id: &str,
        new: &NewBenchmark,
    ) -> Result<Benchmark, ApiError> {
        let value = self
            .api
            .request(
                Method::Post,
                &format!("{}/benchmarks", project_path(project_id)),
                Some(to_body(new)?),
            )
            .await?;
        let body: BenchmarkBody = decode(value)?;

        self.refresh(ResourceKey::Benchmarks, project_id).await;
        Ok(body.benchmark)
    }

    pub async fn create_loss_profile(
        &self,
        project_id: &str,
        new: &NewProfile,
    ) -> Result<LossProfile, ApiError> {
        let value = self
            .api
            .request(
                Method::Post,
                &format!("{}/profiles/loss", project_path(project_id)),
                Some(to_body(new)?),
            )
            .await?;
        let body: ProfileBody<LossProfile> = decode(value)?;

        self.refresh(ResourceKey::LossProfiles, project_id).await;
        Ok(body.profile)
    }

    pub async fn create_perf_profile(
        &self,
        project_id: &str,
        new: &NewProfile,
    ) -> Result<PerfProfile, ApiError> {
        let value = self
            .api
            .request(
                Method::Post,
                &format!("{}/profiles/perf", project_path(project_id)),
                Some(to_body(new)?),
            )
            .await?;
        let body: ProfileBody<PerfProfile> = decode(value)?;

        self.refresh(ResourceKey::PerfProfiles, project_id).await;
        Ok(body.profile)
    }
}

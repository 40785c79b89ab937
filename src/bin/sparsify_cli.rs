//! CLI client for a Sparsify server.
//!
//! Examples:
//!   sparsify-cli status
//!   sparsify-cli projects
//!   sparsify-cli project 3f2a9c
//!   sparsify-cli create-project resnet50 --description "imagenet baseline"
//!   sparsify-cli watch
//!
//! By default it talks to http://localhost:5543; override with `--api URL`,
//! `SPARSIFY_API_URL`, or `api_url` in the data directory's config.json.

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sparsify::models::NewProject;
use sparsify::paths::AppPaths;
use sparsify::prefs::{FileStore, GettingStarted, MemoryStore};
use sparsify::prelude::*;
use sparsify::selectors;
use tokio::sync::watch;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "sparsify-cli")]
#[command(version, about = "Talk to a Sparsify server through the client store")]
struct Cli {
    /// Server base URL (overrides config file and environment)
    #[arg(long, global = true)]
    api: Option<String>,

    /// Poll interval for `watch`, in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Server system info and reachability
    Status,
    /// List projects, most recently modified first
    Projects,
    /// Show one project with its optimizations, benchmarks and profiles
    Project {
        project_id: String,
        /// Optimization to show modifier ranges for (defaults to the first)
        #[arg(long)]
        optim: Option<String>,
    },
    /// Create a project
    CreateProject {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a project
    DeleteProject { project_id: String },
    /// Poll the server and report outages until Ctrl-C
    Watch,
    /// Show the getting-started notes (once, unless re-enabled)
    Welcome {
        /// Never show the notes again
        #[arg(long, conflicts_with = "show_again")]
        never_again: bool,
        /// Show the notes again next time
        #[arg(long)]
        show_again: bool,
    },
    /// Show data directory and config/prefs file paths
    Paths,
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn load_config(cli: &Cli, paths: Option<&AppPaths>) -> ClientConfig {
    let mut cfg = match paths {
        Some(p) => ClientConfig::load(&p.config_file()).unwrap_or_else(|e| fail(e)),
        None => {
            let mut cfg = ClientConfig::default();
            if let Err(e) = cfg.apply_env(|k| std::env::var(k).ok()) {
                fail(e);
            }
            cfg
        }
    };
    if let Some(api) = &cli.api {
        cfg.api_url = api.clone();
    }
    if let Some(ms) = cli.poll_ms {
        cfg.poll_interval_ms = ms;
    }
    cfg
}

fn fmt_opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_resource_error(state: &StoreState, key: ResourceKey) {
    if let Some(err) = selectors::visible_error(state, key) {
        println!("  ! {} failed: {}", key, err);
    } else if selectors::server_down_visible(state) {
        println!("  ! server is down");
    }
}

async fn cmd_status(store: &Store) {
    let check = store.check_server().await;
    match check.result {
        Ok(info) => {
            println!("server: online");
            println!(
                "cpu: vendor={} isa={} vnni={} sockets={} cores/socket={} threads/core={}",
                fmt_opt(info.vendor),
                fmt_opt(info.isa),
                fmt_opt(info.vnni),
                fmt_opt(info.num_sockets),
                fmt_opt(info.cores_per_socket),
                fmt_opt(info.threads_per_core),
            );
            if !info.available_engines.is_empty() {
                println!("engines: {}", info.available_engines.join(", "));
            }
        }
        Err(e) => fail(format!("server offline ({e})")),
    }
}

async fn cmd_projects(store: &Store) {
    if let Err(e) = store.fetch_projects().await {
        fail(e);
    }
    let mut sel = Selectors::new();
    let projects = store.read(|s| sel.sorted_projects(s)).await;
    if projects.is_empty() {
        println!("No projects yet. Create one with `sparsify-cli create-project <name>`.");
        return;
    }
    for p in projects.iter() {
        println!(
            "{:<36} {:<24} modified={}",
            p.project_id,
            p.name,
            p.modified.as_deref().unwrap_or("-")
        );
    }
}

async fn cmd_project(store: &Store, project_id: &str, optim: Option<&str>) {
    let failures = store.load_project(project_id).await;
    if failures.iter().any(|(k, _)| *k == ResourceKey::Project) {
        let msg = failures
            .iter()
            .find(|(k, _)| *k == ResourceKey::Project)
            .map(|(_, e)| e.to_string())
            .unwrap_or_default();
        fail(msg);
    }

    let first_optim = store
        .read(|s| {
            s.selected
                .optimizations
                .val()
                .and_then(|o| o.first())
                .map(|o| o.optim_id.clone())
        })
        .await;
    store
        .select_optimization(optim.or(first_optim.as_deref()))
        .await;

    let mut sel = Selectors::new();
    store
        .read(|s| {
            if let Some(p) = s.selected.project.val() {
                println!("project: {} ({})", p.name, p.project_id);
                if !p.description.is_empty() {
                    println!("  {}", p.description);
                }
                println!(
                    "  training: optimizer={} epochs={} lr={}..{}",
                    p.training_optimizer.as_deref().unwrap_or("-"),
                    fmt_opt(p.training_epochs),
                    fmt_opt(p.training_lr_init),
                    fmt_opt(p.training_lr_final),
                );
            }

            println!("optimizations:");
            match s.selected.optimizations.val() {
                Some(optims) if !optims.is_empty() => {
                    for o in optims {
                        let marker = if s.selected.optim_id.as_deref() == Some(&o.optim_id) {
                            "*"
                        } else {
                            " "
                        };
                        println!(
                            " {} {} {} epochs {}..{}",
                            marker, o.optim_id, o.name, o.start_epoch, o.end_epoch
                        );
                    }
                    for m in sel.selected_modifier_ranges(s).iter() {
                        println!(
                            "     {:<12} {} epochs {}..{} ({:.0}% of training)",
                            m.kind.label(),
                            m.modifier_id,
                            m.range.start,
                            m.range.end,
                            m.range.percent_total * 100.0
                        );
                    }
                }
                Some(_) => println!("  (none)"),
                None => print_resource_error(s, ResourceKey::Optimizations),
            }

            println!("benchmarks:");
            match s.selected.benchmarks.val() {
                Some(list) if !list.is_empty() => {
                    for b in sel.benchmark_speedups(s).iter() {
                        let speedup = b
                            .speedup
                            .map(|x| format!("{x:.2}x"))
                            .unwrap_or_else(|| "-".to_string());
                        println!("  {} {} speedup={}", b.benchmark_id, b.name, speedup);
                    }
                }
                Some(_) => println!("  (none)"),
                None => print_resource_error(s, ResourceKey::Benchmarks),
            }

            println!("profiles:");
            match s.selected.loss_profiles.val() {
                Some(list) => {
                    for p in list {
                        println!("  loss {} {}", p.profile_id, p.name);
                    }
                }
                None => print_resource_error(s, ResourceKey::LossProfiles),
            }
            match s.selected.perf_profiles.val() {
                Some(list) => {
                    for p in list {
                        println!(
                            "  perf {} {} batch={} cores={}",
                            p.profile_id,
                            p.name,
                            fmt_opt(p.batch_size),
                            fmt_opt(p.core_count)
                        );
                    }
                }
                None => print_resource_error(s, ResourceKey::PerfProfiles),
            }
        })
        .await;
}

async fn cmd_watch(store: Store, cfg: &ClientConfig) {
    let mut events = store.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Monitor::new(store.clone(), cfg.poll_interval());
    let handle = tokio::spawn(monitor.run(shutdown_rx));

    println!("watching {} (Ctrl-C to stop)", cfg.api_url);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = events.recv() => match ev {
                Ok(StoreEvent::Reachability(MonitorEvent::WentOffline)) => {
                    println!("server down; waiting for it to come back");
                }
                Ok(StoreEvent::Reachability(MonitorEvent::BackOnline)) => println!("server back online"),
                Ok(StoreEvent::Reachability(MonitorEvent::Reload)) => println!("reloading state"),
                Ok(StoreEvent::Changed(ResourceKey::Projects)) => {
                    let (status, count) = store
                        .read(|s| (s.projects.status(), s.projects.val().map(Vec::len)))
                        .await;
                    if status == ResourceStatus::Succeeded {
                        println!("projects: {}", fmt_opt(count));
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    error!("Dropped {} store events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        error!("Monitor task failed: {}", e);
    }
}

fn cmd_welcome(paths: &AppPaths, never_again: bool, show_again: bool) {
    let mut gs = GettingStarted::new(FileStore::open(paths.prefs_file()), MemoryStore::new());
    if never_again || show_again {
        if let Err(e) = gs.set_do_not_show(never_again) {
            fail(e);
        }
    }
    if gs.open_if_needed() {
        println!("Getting started with Sparsify:");
        println!("  1. create a project from an ONNX model");
        println!("  2. run loss and performance profiles");
        println!("  3. create an optimization and tune its modifiers");
        println!("  4. benchmark the optimized model against the baseline");
        println!("(run `sparsify-cli welcome --show-again` to see this next time)");
    }
}

fn connect(cli: &Cli, paths: Option<&AppPaths>) -> (Store, ClientConfig) {
    let cfg = load_config(cli, paths);
    let api = HttpApi::from_config(&cfg).unwrap_or_else(|e| fail(e));
    (Store::new(Arc::new(api), StoreOptions::from(&cfg)), cfg)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let paths = match AppPaths::new() {
        Ok(p) => Some(p),
        Err(e) => {
            error!("{}", e);
            None
        }
    };

    match &cli.command {
        Command::Paths => {
            let Some(p) = &paths else {
                fail("could not determine data directory");
            };
            println!("Data directory: {}", p.data_dir().display());
            println!("Config file: {}", p.config_file().display());
            println!("Prefs file: {}", p.prefs_file().display());
        }
        Command::Welcome {
            never_again,
            show_again,
        } => {
            let Some(p) = &paths else {
                fail("could not determine data directory");
            };
            cmd_welcome(p, *never_again, *show_again);
        }
        Command::Status => {
            let (store, _) = connect(&cli, paths.as_ref());
            cmd_status(&store).await;
        }
        Command::Projects => {
            let (store, _) = connect(&cli, paths.as_ref());
            cmd_projects(&store).await;
        }
        Command::Project { project_id, optim } => {
            let (store, _) = connect(&cli, paths.as_ref());
            cmd_project(&store, project_id, optim.as_deref()).await;
        }
        Command::CreateProject { name, description } => {
            let (store, _) = connect(&cli, paths.as_ref());
            let new = NewProject {
                name: name.clone(),
                description: description.clone(),
            };
            match store.create_project(&new).await {
                Ok(p) => println!("created {} ({})", p.name, p.project_id),
                Err(e) => fail(e),
            }
        }
        Command::DeleteProject { project_id } => {
            let (store, _) = connect(&cli, paths.as_ref());
            match store.delete_project(project_id).await {
                Ok(()) => println!("deleted {project_id}"),
                Err(e) => fail(e),
            }
        }
        Command::Watch => {
            let (store, cfg) = connect(&cli, paths.as_ref());
            cmd_watch(store, &cfg).await;
        }
    }
}

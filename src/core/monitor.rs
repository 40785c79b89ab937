//! Server reachability.
//!
//! `unknown → {online, offline}`, then `online ⇄ offline` forever. Going
//! offline is reported once no matter how many failed checks follow. Coming
//! back online after the down notice was shown asks for a full reload rather
//! than reconciling each resource on its own.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorEvent {
    WentOffline,
    BackOnline,
    /// Resynchronize everything from scratch.
    Reload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reachability {
    connectivity: Connectivity,
    down_shown: bool,
}

impl Reachability {
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// `None` until the first check settles.
    pub fn online(&self) -> Option<bool> {
        match self.connectivity {
            Connectivity::Unknown => None,
            Connectivity::Online => Some(true),
            Connectivity::Offline => Some(false),
        }
    }

    pub fn down_shown(&self) -> bool {
        self.down_shown
    }

    /// Take down the "server down" notice without waiting for the server.
    /// A later recovery then does not trigger a reload.
    pub fn dismiss_down_notice(&mut self) {
        self.down_shown = false;
    }

    pub fn observe(&mut self, online: bool) -> Vec<MonitorEvent> {
        match (self.connectivity, online) {
            (Connectivity::Offline, false) => Vec::new(),
            (_, false) => {
                self.connectivity = Connectivity::Offline;
                self.down_shown = true;
                vec![MonitorEvent::WentOffline]
            }
            (Connectivity::Offline, true) => {
                self.connectivity = Connectivity::Online;
                let mut events = vec![MonitorEvent::BackOnline];
                if self.down_shown {
                    self.down_shown = false;
                    events.push(MonitorEvent::Reload);
                }
                events
            }
            (_, true) => {
                self.connectivity = Connectivity::Online;
                Vec::new()
            }
        }
    }
}

/// Periodic status checks against the server.
pub struct Monitor {
    store: Store,
    interval: Duration,
    auto_reload: bool,
}

impl Monitor {
    pub fn new(store: Store, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(50)),
            auto_reload: true,
        }
    }

    /// Leave `Reload` handling to whoever subscribes to store events.
    pub fn without_auto_reload(mut self) -> Self {
        self.auto_reload = false;
        self
    }

    /// One status-check cycle. Returns the transitions it caused.
    pub async fn check(&self) -> Vec<MonitorEvent> {
        let check = self.store.check_server().await;
        if let Err(e) = &check.result {
            debug!("Status check: {}", e);
        }

        if self.auto_reload && check.events.contains(&MonitorEvent::Reload) {
            self.store.handle_reload().await;
        }
        check.events
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Reachability monitor started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for event in self.check().await {
                        match event {
                            MonitorEvent::WentOffline => warn!("Server went offline"),
                            MonitorEvent::BackOnline => info!("Server back online"),
                            MonitorEvent::Reload => info!("Reload triggered"),
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reachability monitor stopped");
    }
}

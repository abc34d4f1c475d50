// src/curfew/mod.rs
//! Cisza nocna: jedno długo żyjące zadanie na grupę, które w oknie wycisza całą grupę
//! i zdejmuje wyciszenie po jego końcu.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CurfewConfig;
use crate::error::{ConfigError, TransportError};
use crate::onebot::GroupActions;

pub mod window;

pub use window::CurfewWindow;

const TIME_PLACEHOLDER: &str = "{time}";

/// Rozwiązana konfiguracja jednej grupy.
#[derive(Debug, Clone)]
pub struct CurfewPlan {
    pub group_id: i64,
    pub window: CurfewWindow,
    pub offset: FixedOffset,
    pub backoff: Duration,
    pub start_text: String,
    pub end_text: String,
}

impl CurfewPlan {
    /// `Ok(None)` = cisza nocna wyłączona dla tej grupy.
    pub fn resolve(cfg: &CurfewConfig, group_id: i64) -> Result<Option<Self>, ConfigError> {
        let ov = cfg.groups.get(&group_id.to_string());
        let enabled = ov.and_then(|o| o.enabled).unwrap_or(cfg.enabled);
        if !enabled {
            return Ok(None);
        }

        let start = ov.and_then(|o| o.start.as_deref()).unwrap_or(&cfg.start);
        let hours = ov.and_then(|o| o.duration_hours).unwrap_or(cfg.duration_hours);
        let window = CurfewWindow::new(start, hours)?;
        let offset = FixedOffset::east_opt(cfg.utc_offset_hours.saturating_mul(3600)).ok_or_else(|| {
            ConfigError::Invalid {
                field: "curfew.utc_offset_hours",
                reason: format!("{} is not a valid offset", cfg.utc_offset_hours),
            }
        })?;

        Ok(Some(Self {
            group_id,
            window,
            offset,
            backoff: Duration::from_secs(cfg.error_backoff_secs.max(1)),
            start_text: cfg.start_template.replace(TIME_PLACEHOLDER, &window.start_display()),
            end_text: cfg.end_template.replace(TIME_PLACEHOLDER, &window.end_display()),
        }))
    }
}

/// Źródło czasu dla harmonogramu.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurfewTaskState {
    pub group_id: i64,
    pub running: bool,
    pub muted: bool,
}

/* =========================================
   Zadanie jednej grupy
   ========================================= */

pub struct CurfewTask {
    group_id: i64,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<CurfewTaskState>,
    handle: JoinHandle<()>,
}

impl CurfewTask {
    pub fn spawn(plan: CurfewPlan, platform: Arc<dyn GroupActions>) -> Self {
        Self::spawn_with_clock(plan, platform, Arc::new(SystemClock))
    }

    pub fn spawn_with_clock(plan: CurfewPlan, platform: Arc<dyn GroupActions>, clock: Arc<dyn Clock>) -> Self {
        let group_id = plan.group_id;
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(CurfewTaskState {
            group_id,
            running: true,
            muted: false,
        });

        let runner = Runner {
            plan,
            platform,
            clock,
            muted: false,
            announced: None,
            state_tx,
            stop_rx,
        };
        let handle = tokio::spawn(runner.run());
        info!(group_id, "curfew task started");

        Self {
            group_id,
            stop_tx,
            state_rx,
            handle,
        }
    }

    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    pub fn state(&self) -> CurfewTaskState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CurfewTaskState> {
        self.state_rx.clone()
    }

    /// Przerywa sen, zdejmuje wyciszenie (jeśli było) i czeka na koniec zadania.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(group_id = self.group_id, error = ?e, "curfew task ended abnormally");
        }
        info!(group_id = self.group_id, "curfew task stopped");
    }
}

struct Runner {
    plan: CurfewPlan,
    platform: Arc<dyn GroupActions>,
    clock: Arc<dyn Clock>,
    muted: bool,
    /// Przejście, dla którego ogłoszenie już poszło (lub zawiodło); zerowane, gdy stan zgadza się z oknem.
    announced: Option<bool>,
    state_tx: watch::Sender<CurfewTaskState>,
    stop_rx: watch::Receiver<bool>,
}

impl Runner {
    async fn run(mut self) {
        let group_id = self.plan.group_id;
        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            let wait = match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(secs)) => Duration::from_secs(secs),
                Ok(Err(TransportError::Unavailable)) => {
                    debug!(group_id, "platform unavailable, curfew check skipped");
                    self.plan.backoff
                }
                Ok(Err(e)) => {
                    warn!(group_id, error = %e, "curfew iteration failed, backing off");
                    self.plan.backoff
                }
                Err(_) => {
                    error!(group_id, "curfew iteration panicked, backing off");
                    self.plan.backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                res = self.stop_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        self.release().await;
        self.state_tx.send_modify(|s| s.running = false);
    }

    /// Jedna iteracja; zwraca sekundy do następnego sprawdzenia.
    /// Nieudane (od)ciszenie jest logowane, kolejna próba przy następnym sprawdzeniu.
    async fn tick(&mut self) -> Result<u64, TransportError> {
        if !self.platform.is_available() {
            return Err(TransportError::Unavailable);
        }
        let now = self.clock.now().with_timezone(&self.plan.offset).naive_local();
        let in_window = self.plan.window.is_curfew_time(now.time());

        if in_window != self.muted {
            self.transition(in_window).await;
        } else {
            self.announced = None;
        }
        Ok(self.plan.window.next_check_seconds(now))
    }

    /// Ogłoszenie (raz na przejście) i (od)ciszenie; oba kroki niezależne.
    async fn transition(&mut self, mute: bool) {
        let group_id = self.plan.group_id;
        if self.announced != Some(mute) {
            self.announced = Some(mute);
            let text = if mute { &self.plan.start_text } else { &self.plan.end_text };
            if let Err(e) = self.platform.send_group_msg(group_id, text).await {
                warn!(group_id, mute, error = %e, "curfew announcement failed");
            }
        }

        match self.platform.set_group_whole_ban(group_id, mute).await {
            Ok(()) => {
                self.set_muted(mute);
                if mute {
                    info!(group_id, "curfew started, group muted");
                } else {
                    info!(group_id, "curfew ended, group unmuted");
                }
            }
            Err(e) => warn!(group_id, mute, error = %e, "whole-group mute change failed"),
        }
    }

    async fn release(&mut self) {
        if !self.muted {
            return;
        }
        let group_id = self.plan.group_id;
        match self.platform.set_group_whole_ban(group_id, false).await {
            Ok(()) => {
                self.set_muted(false);
                info!(group_id, "group unmuted on curfew stop");
            }
            Err(e) => error!(group_id, error = %e, "failed to unmute group on curfew stop"),
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.state_tx.send_modify(|s| s.muted = muted);
    }
}

/* =========================================
   Menedżer
   ========================================= */

pub struct CurfewManager {
    platform: Arc<dyn GroupActions>,
    tasks: Mutex<HashMap<i64, CurfewTask>>,
}

impl CurfewManager {
    pub fn new(platform: Arc<dyn GroupActions>) -> Self {
        Self {
            platform,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Startuje zadania dla wszystkich grup; zła konfiguracja wyłącza tylko daną grupę.
    pub async fn start_all<I>(&self, cfg: &CurfewConfig, groups: I) -> usize
    where
        I: IntoIterator<Item = i64>,
    {
        let mut started = 0;
        for group_id in groups {
            match CurfewPlan::resolve(cfg, group_id) {
                Ok(Some(plan)) => {
                    if self.start(plan).await {
                        started += 1;
                    }
                }
                Ok(None) => debug!(group_id, "curfew disabled for group"),
                Err(e) => error!(group_id, error = %e, "invalid curfew config, group skipped"),
            }
        }
        if started == 0 {
            info!("no curfew tasks started");
        }
        started
    }

    pub async fn start(&self, plan: CurfewPlan) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&plan.group_id) {
            warn!(group_id = plan.group_id, "curfew task already running");
            return false;
        }
        let group_id = plan.group_id;
        tasks.insert(group_id, CurfewTask::spawn(plan, self.platform.clone()));
        true
    }

    pub async fn state(&self, group_id: i64) -> Option<CurfewTaskState> {
        self.tasks.lock().await.get(&group_id).map(CurfewTask::state)
    }

    pub async fn running(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn stop_all(&self) {
        let tasks: Vec<CurfewTask> = self.tasks.lock().await.drain().map(|(_, t)| t).collect();
        futures_util::future::join_all(tasks.into_iter().map(CurfewTask::stop)).await;
    }
}

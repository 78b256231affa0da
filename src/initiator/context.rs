// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt::Write,
    sync::{
        Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use dashmap::DashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    cfg::{
        config::{Config, RuntimeConfig},
        enums::YesNo,
    },
    client::{
        command::{Command, CommandKind, ScsiArgs},
        pool_sessions::SessionPool,
        session::{Session, SessionExit, SessionSetup, SessionState, WorkerFlags},
        tag_table::{TagGenerator, TagTable},
    },
    error::InitiatorError,
    initiator::{discovery::Discovered, dispatcher, logout::logout_phase},
    models::common::NO_TAG,
    params::{Credentials, ParamList},
};

/// One slot of the target table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// IQN to log in to. Empty until configured or discovered.
    pub target_name: String,
    /// IQN discovery should pick out of the SendTargets answer.
    pub iqn_wanted: String,
    /// Flat `name, address` list from the last discovery.
    pub all_targets: Vec<String>,
}

/// Read-only view of one target and its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub index: usize,
    pub target: Target,
    pub state: Option<SessionState>,
    pub tx_error: bool,
    pub rx_error: bool,
}

/// Owns every target slot and session of one initiator instance.
///
/// Built with [`InitiatorContext::start`], which also spawns the enqueue
/// dispatcher. Call [`InitiatorContext::shutdown`] to log out and release
/// everything.
pub struct InitiatorContext {
    targets: Vec<RwLock<Target>>,
    sessions: DashMap<usize, Arc<Session>>,
    pool: SessionPool,
    tags: Arc<TagTable>,
    tag_gen: Arc<TagGenerator>,
    enqueue_tx: mpsc::Sender<Arc<Command>>,
    reaper_tx: mpsc::UnboundedSender<SessionExit>,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<mpsc::Receiver<Arc<Command>>>>>,
    generation: AtomicU64,
    shut_down: AtomicBool,
    initiator_name: String,
    initiator_alias: String,
    initial_r2t: YesNo,
    runtime: RuntimeConfig,
}

impl InitiatorContext {
    /// Fill the target table from `cfg`, seed the session pool and spawn
    /// the dispatcher. Must run inside a tokio runtime.
    pub fn start(cfg: &Config) -> Result<Arc<Self>> {
        let first = cfg
            .targets
            .first()
            .context("at least one target must be configured")?;
        let max = cfg.runtime.max_targets;

        let targets = (0..max)
            .map(|i| {
                let t = match cfg.targets.get(i) {
                    Some(t) => Target {
                        name: t.name.clone(),
                        host: t.host.clone(),
                        port: t.port,
                        target_name: t.target_name.clone(),
                        iqn_wanted: t.target_name.clone(),
                        all_targets: Vec::new(),
                    },
                    None => Target {
                        name: format!("target{i}"),
                        host: first.host.clone(),
                        port: first.port,
                        ..Default::default()
                    },
                };
                RwLock::new(t)
            })
            .collect();

        let creds = Credentials::from(&cfg.auth);
        let (enqueue_tx, enqueue_rx) = mpsc::channel(cfg.runtime.queue_depth);
        let (reaper_tx, reaper_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(Self {
            targets,
            sessions: DashMap::new(),
            pool: SessionPool::new(max, &creds),
            tags: Arc::new(TagTable::new()),
            tag_gen: Arc::new(TagGenerator::default()),
            enqueue_tx,
            reaper_tx,
            cancel: CancellationToken::new(),
            dispatcher: Mutex::new(None),
            generation: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            initiator_name: cfg.initiator.initiator_name.clone(),
            initiator_alias: cfg.initiator.initiator_alias.clone(),
            initial_r2t: cfg.initiator.initial_r2t,
            runtime: cfg.runtime.clone(),
        });

        let handle = tokio::spawn(
            dispatcher::run(ctx.clone(), enqueue_rx, reaper_rx, ctx.cancel.clone())
                .instrument(info_span!("dispatcher")),
        );
        *ctx.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            initiator = %ctx.initiator_name,
            targets = max,
            "initiator started"
        );
        Ok(ctx)
    }

    pub fn max_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn login_timeout(&self) -> Duration {
        self.runtime.login_timeout
    }

    fn slot(&self, index: usize) -> Result<&RwLock<Target>, InitiatorError> {
        self.targets.get(index).ok_or_else(|| {
            InitiatorError::InvalidCommand(format!(
                "target {index} out of range [0..{})",
                self.targets.len()
            ))
        })
    }

    fn read(&self, index: usize) -> Result<RwLockReadGuard<'_, Target>, InitiatorError> {
        Ok(self
            .slot(index)?
            .read()
            .unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, index: usize) -> Result<RwLockWriteGuard<'_, Target>, InitiatorError> {
        Ok(self
            .slot(index)?
            .write()
            .unwrap_or_else(PoisonError::into_inner))
    }

    pub fn configure_target(&self, index: usize, host: &str, port: u16) -> Result<()> {
        let mut t = self.write(index)?;
        t.host = host.to_string();
        t.port = port;
        debug!(index, host, port, "target configured");
        Ok(())
    }

    /// Ask for `iqn` on this slot. It is used directly for login and also
    /// picked out of any later discovery answer.
    pub fn set_target_name(&self, index: usize, iqn: &str) -> Result<()> {
        let mut t = self.write(index)?;
        t.iqn_wanted = iqn.to_string();
        t.target_name = iqn.to_string();
        Ok(())
    }

    pub fn target(&self, index: usize) -> Result<Target> {
        Ok(self.read(index)?.clone())
    }

    /// Targets reported by the last discovery on this slot.
    pub fn get_targets(&self, index: usize) -> Result<Vec<String>> {
        let t = self.read(index)?;
        if !self.sessions.contains_key(&index) {
            return Err(InitiatorError::NoSession(index).into());
        }
        Ok(t.all_targets.clone())
    }

    pub fn target_info(&self, index: usize) -> Result<TargetInfo> {
        let target = self.target(index)?;
        let sess = self.session(index);
        Ok(TargetInfo {
            index,
            target,
            state: sess.as_ref().map(|s| s.state()),
            tx_error: sess
                .as_ref()
                .is_some_and(|s| s.tx_state.contains(WorkerFlags::ERROR)),
            rx_error: sess
                .as_ref()
                .is_some_and(|s| s.rx_state.contains(WorkerFlags::ERROR)),
        })
    }

    /// Status table, one row per target slot.
    pub fn info(&self) -> String {
        let mut out = format!("  {:>3} {:>30} {:>25}\n\n", "TID", "TargetName", "TargetAddress");
        for index in 0..self.targets.len() {
            let Ok(info) = self.target_info(index) else {
                continue;
            };
            let t = &info.target;
            let _ = write!(
                out,
                "  {:>3} {:>30} {:>20}:{} (",
                index, t.target_name, t.host, t.port
            );
            match info.state {
                Some(state) => {
                    out.push_str(state.describe());
                    if info.tx_error {
                        out.push_str(" **Tx Error** ");
                    }
                    if info.rx_error {
                        out.push_str(" **Rx Error** ");
                    }
                },
                None => out.push_str("No Session"),
            }
            out.push_str(")\n");
        }
        out
    }

    /// The live session of `index`, if any.
    pub fn session(&self, index: usize) -> Option<Arc<Session>> {
        self.sessions.get(&index).map(|s| s.value().clone())
    }

    /// Commands waiting for a response, over every session.
    pub fn in_flight(&self) -> usize {
        self.tags.len()
    }

    pub fn has_session(&self, index: usize) -> bool {
        self.sessions.contains_key(&index)
    }

    pub(crate) fn next_tag(&self) -> u32 {
        self.tag_gen.next_tag()
    }

    /// Hand `cmd` on without blocking.
    ///
    /// A command for a logged-in, healthy session gets a fresh tag and goes
    /// straight to its Tx queue. Anything else is left to the dispatcher,
    /// which builds the session first.
    pub fn enqueue(&self, cmd: Arc<Command>) -> Result<(), InitiatorError> {
        cmd.claim()?;
        self.enqueue_claimed(cmd)
    }

    fn enqueue_claimed(&self, cmd: Arc<Command>) -> Result<(), InitiatorError> {
        let res = self.route(cmd.clone());
        if res.is_err() {
            cmd.unclaim();
        }
        res
    }

    fn route(&self, cmd: Arc<Command>) -> Result<(), InitiatorError> {
        let index = cmd.target();
        self.slot(index)?;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(InitiatorError::Shutdown);
        }

        if let Some(sess) = self.session(index)
            && sess.state() == SessionState::LoggedInNormal
            && sess.is_healthy()
        {
            match cmd.kind() {
                CommandKind::Scsi => cmd.set_tag(self.next_tag()),
                CommandKind::Nop => {
                    if cmd.tag() != NO_TAG {
                        cmd.set_tag(self.next_tag());
                    }
                },
                other => {
                    return Err(InitiatorError::InvalidCommand(format!(
                        "{other:?} commands cannot be enqueued"
                    )));
                },
            }
            return sess.queue(cmd);
        }

        self.enqueue_tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InitiatorError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => InitiatorError::Shutdown,
        })
    }

    /// Enqueue `cmd` and wait for its final status.
    pub async fn submit(&self, cmd: Arc<Command>) -> Result<i32> {
        cmd.claim()?;
        let done = cmd.completion();
        self.enqueue_claimed(cmd)?;
        done.await
            .map_err(|_| anyhow!("command dropped before completion"))
    }

    /// Like [`submit`](Self::submit), failing unless the status is 0.
    pub async fn command(&self, cmd: Arc<Command>) -> Result<()> {
        match self.submit(cmd).await? {
            0 => Ok(()),
            status => Err(InitiatorError::CommandFailed(status).into()),
        }
    }

    /// TEST UNIT READY on LUN 0 of `target`. `Ok(false)` when the command
    /// went through but the unit answered with anything but GOOD.
    pub async fn unit_ready(&self, target: usize) -> Result<bool> {
        let tur = Command::scsi(target, ScsiArgs::no_data(0, [0u8; 16]));
        self.command(tur.clone()).await?;
        let (status, sense) = tur.with_scsi(|a| (a.status, a.sense.clone()))?;
        if status != 0 {
            warn!(target, status, ?sense, "unit not ready");
        }
        Ok(status == 0)
    }

    /// Drop all local bookkeeping for `cmd` and fail it. The PDU may
    /// already be on the wire.
    pub fn abort(&self, cmd: &Arc<Command>) {
        if self.tags.remove_if_same(cmd.tag(), cmd).is_none() {
            debug!(tag = cmd.tag(), "abort: tag not in flight");
        }
        if let Some(sess) = self.session(cmd.target()) {
            sess.outstanding.remove(cmd);
        }
        cmd.complete(-1);
    }

    /// Ping `target`, building and logging in its session if needed. A
    /// non-empty `host` replaces the configured address first.
    pub async fn discover(&self, host: &str, target: usize, lun: u64) -> Result<()> {
        if !host.is_empty() {
            self.write(target)?.host = host.to_string();
        }
        self.command(Command::nop(target, lun, vec![0], false)).await
    }

    /// Stop the dispatcher, fail what it never handled, then log out of and
    /// destroy every session.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("initiator shutting down");
        self.cancel.cancel();

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle {
            match h.await {
                Ok(mut queue) => {
                    queue.close();
                    let mut failed = 0usize;
                    while let Ok(cmd) = queue.try_recv() {
                        cmd.complete(-1);
                        failed += 1;
                    }
                    if failed > 0 {
                        debug!(failed, "failed queued commands");
                    }
                },
                Err(e) => warn!("dispatcher join failed: {e}"),
            }
        }

        let active: Vec<Arc<Session>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        for sess in active {
            let logged_in = matches!(
                sess.state(),
                SessionState::LoggedInNormal | SessionState::LoggedInDiscovery
            );
            if logged_in && !sess.rx_state.contains(WorkerFlags::ERROR) {
                if let Err(e) = logout_phase(&sess, self.runtime.login_timeout).await {
                    warn!(target = sess.target, "logout failed: {e:#}");
                }
            }
            self.destroy(&sess).await;
        }
        info!("initiator stopped");
    }

    /// Build and start a session for `index`. The slot must have none.
    pub async fn session_init(&self, index: usize) -> Result<Arc<Session>> {
        let (addr, name) = {
            let t = self.read(index)?;
            let host = if t.host.contains(':') && !t.host.starts_with('[') {
                format!("[{}]", t.host)
            } else {
                t.host.clone()
            };
            (format!("{host}:{}", t.port), t.name.clone())
        };
        if self.sessions.contains_key(&index) {
            return Err(anyhow!("target {index} already has a session"));
        }

        let mut params =
            ParamList::default_initiator_list(&self.initiator_name, &self.initiator_alias);
        params.set("InitialR2T", &self.initial_r2t.to_string())?;

        let slot = self.pool.acquire()?;
        let sess = Session::new(SessionSetup {
            target: index,
            generation: self.generation.fetch_add(1, Ordering::SeqCst),
            addr,
            connect_timeout: self.runtime.timeout_connection,
            queue_depth: self.runtime.queue_depth,
            params,
            slot,
            tags: self.tags.clone(),
            tag_gen: self.tag_gen.clone(),
            reaper: self.reaper_tx.clone(),
        });
        self.sessions.insert(index, sess.clone());

        if let Err(e) = sess.start().await {
            self.destroy(&sess).await;
            return Err(e.context(format!("session init for {name} failed")));
        }
        Ok(sess)
    }

    /// Destroy the session of `index`: every outstanding and queued command
    /// is failed before this returns.
    pub async fn session_destroy(&self, index: usize) -> Result<()> {
        let sess = self.session(index).ok_or(InitiatorError::NoSession(index))?;
        self.destroy(&sess).await;
        Ok(())
    }

    pub(crate) async fn destroy(&self, sess: &Arc<Session>) {
        sess.destroy().await;
        if self
            .sessions
            .remove_if(&sess.target, |_, s| Arc::ptr_eq(s, sess))
            .is_some()
        {
            self.pool.release(sess.slot().clone());
        }
    }

    /// Tear down a session whose worker died, unless it was already
    /// replaced.
    pub(crate) async fn reap(&self, exit: SessionExit) {
        match self.session(exit.target) {
            Some(sess) if sess.generation == exit.generation => {
                warn!(target = exit.target, "reaping session after worker exit");
                self.destroy(&sess).await;
            },
            _ => debug!(target = exit.target, "stale worker exit ignored"),
        }
    }

    pub(crate) fn apply_discovery(&self, index: usize, d: Discovered) -> Result<()> {
        let mut t = self.write(index)?;
        t.target_name = d.target_name;
        t.host = d.host;
        t.port = d.port;
        t.all_targets = d.all_targets;
        Ok(())
    }
}

impl std::fmt::Debug for InitiatorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitiatorContext")
            .field("targets", &self.targets.len())
            .field("sessions", &self.sessions.len())
            .field("pool_available", &self.pool.available())
            .field("in_flight", &self.tags.len())
            .finish()
    }
}

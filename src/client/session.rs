// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, AtomicU16, AtomicU32, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use bitflags::bitflags;
use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    client::{
        command::Command,
        common::wait_status,
        connection::write_pdu,
        outstanding::Outstanding,
        pool_sessions::PoolSlot,
        tag_table::{TagGenerator, TagTable},
        tx_worker,
    },
    error::InitiatorError,
    models::common::HEADER_LEN,
    params::{Credentials, ParamList},
    utils::isid_for_target,
};

/// Lifecycle of one session, in the order it is normally walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Initializing = 0,
    Initialized,
    Connecting,
    Connected,
    LoggingIn,
    Authenticated,
    LoggedInNormal,
    LoggedInDiscovery,
    LoggingOut,
    LoggedOut,
    Destroying,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::Initialized,
            2 => Self::Connecting,
            3 => Self::Connected,
            4 => Self::LoggingIn,
            5 => Self::Authenticated,
            6 => Self::LoggedInNormal,
            7 => Self::LoggedInDiscovery,
            8 => Self::LoggingOut,
            9 => Self::LoggedOut,
            _ => Self::Destroying,
        }
    }

    /// Wording used by the status report.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::LoggingIn => "logging in",
            Self::Authenticated => "authenticated",
            Self::LoggedInNormal => "Normal session",
            Self::LoggedInDiscovery => "Discovery session",
            Self::LoggingOut => "logging out",
            Self::LoggedOut => "logged out",
            Self::Destroying => "destroying",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct WorkerFlags: u8 {
        const STARTED = 0b001;
        const ERROR   = 0b010;
        const EXITING = 0b100;
    }
}

/// Lock-free flag word of one worker task.
#[derive(Debug, Default)]
pub struct WorkerState(AtomicU8);

impl WorkerState {
    pub fn set(&self, f: WorkerFlags) {
        self.0.fetch_or(f.bits(), Ordering::SeqCst);
    }

    pub fn flags(&self) -> WorkerFlags {
        WorkerFlags::from_bits_retain(self.0.load(Ordering::SeqCst))
    }

    pub fn contains(&self, f: WorkerFlags) -> bool {
        self.flags().contains(f)
    }
}

/// Negotiated values the data path reads on every command. Refreshed from
/// the parameter table before each command leaves the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub max_burst_length: usize,
    pub first_burst_length: usize,
    pub max_recv_data_segment_length: usize,
    pub immediate_data: bool,
    pub initial_r2t: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            max_burst_length: 262_144,
            first_burst_length: 65_536,
            max_recv_data_segment_length: 8192,
            immediate_data: true,
            initial_r2t: true,
        }
    }
}

impl SessionParams {
    pub fn from_list(list: &ParamList) -> Result<Self> {
        Ok(Self {
            max_burst_length: list.num_value("MaxBurstLength")? as usize,
            first_burst_length: list.num_value("FirstBurstLength")? as usize,
            max_recv_data_segment_length: list.num_value("MaxRecvDataSegmentLength")?
                as usize,
            immediate_data: list.bool_value("ImmediateData")?,
            initial_r2t: list.bool_value("InitialR2T")?,
        })
    }
}

/// Sent to the dispatcher when a worker dies on its own, so the session
/// gets torn down without anyone calling destroy explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit {
    pub target: usize,
    pub generation: u64,
}

/// Everything a new session needs from the initiator context.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub target: usize,
    pub generation: u64,
    pub addr: String,
    pub connect_timeout: Duration,
    pub queue_depth: usize,
    /// Initiator keys with any configured preferences already applied.
    pub params: ParamList,
    pub slot: PoolSlot,
    pub tags: Arc<TagTable>,
    pub tag_gen: Arc<TagGenerator>,
    pub reaper: mpsc::UnboundedSender<SessionExit>,
}

/// One iSCSI session over one TCP connection, driven by a Tx and an Rx
/// task.
pub struct Session {
    pub target: usize,
    pub generation: u64,
    pub isid: [u8; 6],
    pub cid: u16,
    pub(crate) addr: String,
    pub(crate) connect_timeout: Duration,
    slot: PoolSlot,

    state: AtomicU8,
    pub tx_state: WorkerState,
    pub rx_state: WorkerState,

    cmd_sn: AtomicU32,
    exp_stat_sn: AtomicU32,
    max_cmd_sn: AtomicU32,
    tsih: AtomicU16,

    params: Mutex<ParamList>,
    snapshot: Mutex<SessionParams>,

    pub outstanding: Outstanding,
    pub(crate) tags: Arc<TagTable>,
    tag_gen: Arc<TagGenerator>,

    tx_queue: mpsc::Sender<Arc<Command>>,
    pending_queue: Mutex<Option<mpsc::Receiver<Arc<Command>>>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,

    pub(crate) tx_cancel: CancellationToken,
    pub(crate) rx_cancel: CancellationToken,
    tx_handle: Mutex<Option<JoinHandle<mpsc::Receiver<Arc<Command>>>>>,
    rx_handle: Mutex<Option<JoinHandle<()>>>,
    reaper: mpsc::UnboundedSender<SessionExit>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(setup: SessionSetup) -> Arc<Self> {
        let (isid, _) = isid_for_target(setup.target);
        let (tx, rx) = mpsc::channel(setup.queue_depth.max(1));
        Arc::new(Self {
            target: setup.target,
            generation: setup.generation,
            isid,
            cid: setup.target as u16,
            addr: setup.addr,
            connect_timeout: setup.connect_timeout,
            slot: setup.slot,
            state: AtomicU8::new(SessionState::Initializing as u8),
            tx_state: WorkerState::default(),
            rx_state: WorkerState::default(),
            cmd_sn: AtomicU32::new(0),
            exp_stat_sn: AtomicU32::new(0),
            max_cmd_sn: AtomicU32::new(0),
            tsih: AtomicU16::new(0),
            params: Mutex::new(setup.params),
            snapshot: Mutex::new(SessionParams::default()),
            outstanding: Outstanding::default(),
            tags: setup.tags,
            tag_gen: setup.tag_gen,
            tx_queue: tx,
            pending_queue: Mutex::new(Some(rx)),
            writer: tokio::sync::Mutex::new(None),
            tx_cancel: CancellationToken::new(),
            rx_cancel: CancellationToken::new(),
            tx_handle: Mutex::new(None),
            rx_handle: Mutex::new(None),
            reaper: setup.reaper,
        })
    }

    /// Spawn the Tx worker and wait until the connection is up and the Rx
    /// worker is reading.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let queue = lock(&self.pending_queue)
            .take()
            .context("session already started")?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let span = info_span!("tx", target = self.target, isid = %hex::encode(self.isid));
        let handle = tokio::spawn(tx_worker::run(self.clone(), queue, ready_tx).instrument(span));
        *lock(&self.tx_handle) = Some(handle);

        match ready_rx.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(e),
            Err(_) => bail!("Tx worker exited before signalling start"),
        }
        if self.state() == SessionState::Destroying
            || self.tx_state.contains(WorkerFlags::ERROR)
        {
            bail!("session {} failed while starting", self.target);
        }
        self.set_state(SessionState::Initialized);
        info!(target = self.target, addr = %self.addr, "session initialized");
        Ok(())
    }

    pub(crate) fn set_rx_handle(&self, h: JoinHandle<()>) {
        *lock(&self.rx_handle) = Some(h);
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, s: SessionState) {
        debug!(target = self.target, state = %s, "session state");
        self.state.store(s as u8, Ordering::SeqCst);
    }

    /// Neither worker has died on its own.
    pub fn is_healthy(&self) -> bool {
        !self.tx_state.contains(WorkerFlags::ERROR) && !self.rx_state.contains(WorkerFlags::ERROR)
    }

    pub fn slot(&self) -> &PoolSlot {
        &self.slot
    }

    pub fn creds(&self) -> &Credentials {
        &self.slot.creds
    }

    pub fn params(&self) -> MutexGuard<'_, ParamList> {
        lock(&self.params)
    }

    pub fn snapshot(&self) -> SessionParams {
        *lock(&self.snapshot)
    }

    /// Copy the negotiated values the data path needs out of the parameter
    /// table.
    pub fn refresh_snapshot(&self) -> Result<SessionParams> {
        let p = SessionParams::from_list(&self.params())?;
        *lock(&self.snapshot) = p;
        Ok(p)
    }

    pub fn next_tag(&self) -> u32 {
        self.tag_gen.next_tag()
    }

    pub fn cmd_sn(&self) -> u32 {
        self.cmd_sn.load(Ordering::SeqCst)
    }

    /// Current CmdSN, then advance it.
    pub fn next_cmd_sn(&self) -> u32 {
        self.cmd_sn.fetch_add(1, Ordering::SeqCst)
    }

    pub fn set_cmd_sn(&self, v: u32) {
        self.cmd_sn.store(v, Ordering::SeqCst);
    }

    pub fn exp_stat_sn(&self) -> u32 {
        self.exp_stat_sn.load(Ordering::SeqCst)
    }

    pub fn set_exp_stat_sn(&self, v: u32) {
        self.exp_stat_sn.store(v, Ordering::SeqCst);
    }

    pub fn max_cmd_sn(&self) -> u32 {
        self.max_cmd_sn.load(Ordering::SeqCst)
    }

    pub fn set_max_cmd_sn(&self, v: u32) {
        self.max_cmd_sn.store(v, Ordering::SeqCst);
    }

    pub fn tsih(&self) -> u16 {
        self.tsih.load(Ordering::SeqCst)
    }

    pub fn set_tsih(&self, v: u16) {
        self.tsih.store(v, Ordering::SeqCst);
    }

    /// Hand `cmd` to the Tx worker without waiting.
    pub fn queue(&self, cmd: Arc<Command>) -> Result<(), InitiatorError> {
        self.tx_queue.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InitiatorError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => InitiatorError::NoSession(self.target),
        })
    }

    /// Queue `cmd` and wait for its status. On timeout the command is
    /// aborted and an error returned.
    pub async fn exchange(&self, cmd: Arc<Command>, limit: Duration) -> Result<i32> {
        let done = cmd.completion();
        self.queue(cmd.clone())?;
        match wait_status(done, limit).await? {
            Some(status) => Ok(status),
            None => {
                warn!(target = self.target, kind = ?cmd.kind(), "no response within {limit:?}, aborting");
                self.abort(&cmd);
                bail!("{:?} exchange timed out after {limit:?}", cmd.kind())
            },
        }
    }

    /// Unregister `cmd` and fail it.
    pub fn abort(&self, cmd: &Arc<Command>) {
        self.tags.remove_if_same(cmd.tag(), cmd);
        self.outstanding.remove(cmd);
        cmd.complete(-1);
    }

    /// Fail everything on the outstanding list.
    pub fn fail_outstanding(&self) -> usize {
        let cmds = self.outstanding.drain();
        for cmd in &cmds {
            self.tags.remove_if_same(cmd.tag(), cmd);
            cmd.complete(-1);
        }
        cmds.len()
    }

    /// Write one PDU on the connection. Tx and Rx both send through here.
    pub async fn send_pdu<'a, I>(&self, header: &[u8; HEADER_LEN], parts: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut guard = self.writer.lock().await;
        let w = guard
            .as_mut()
            .ok_or_else(|| anyhow!("session {} is not connected", self.target))?;
        write_pdu(w, header, parts).await
    }

    pub(crate) async fn set_writer(&self, w: OwnedWriteHalf) {
        *self.writer.lock().await = Some(w);
    }

    /// Shut the sending side of the socket. The target sees EOF and closes
    /// its end, which in turn ends the Rx worker's read.
    pub async fn close_writer(&self) {
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
    }

    /// Worker epilogue: an exit the session did not ask for marks the
    /// worker failed and asks the dispatcher to reap the session.
    pub(crate) fn worker_exited(&self, worker: &WorkerState, name: &'static str) {
        worker.set(WorkerFlags::EXITING);
        if self.state() != SessionState::Destroying {
            worker.set(WorkerFlags::ERROR);
            warn!(target = self.target, worker = name, "worker exited unexpectedly");
            let _ = self.reaper.send(SessionExit {
                target: self.target,
                generation: self.generation,
            });
        } else {
            debug!(target = self.target, worker = name, "worker exited");
        }
    }

    /// Tear the session down: fail outstanding work, stop Tx and fail what
    /// it never sent, stop Rx, close the socket.
    pub async fn destroy(&self) {
        info!(target = self.target, state = %self.state(), "destroying session");
        self.set_state(SessionState::Destroying);
        let failed = self.fail_outstanding();
        if failed > 0 {
            debug!(target = self.target, failed, "failed outstanding commands");
        }

        self.tx_cancel.cancel();
        let tx = lock(&self.tx_handle).take();
        let mut queue = match tx {
            Some(h) => match h.await {
                Ok(q) => Some(q),
                Err(e) => {
                    warn!(target = self.target, "Tx worker join failed: {e}");
                    None
                },
            },
            None => lock(&self.pending_queue).take(),
        };
        if let Some(q) = queue.as_mut() {
            q.close();
            while let Ok(cmd) = q.try_recv() {
                self.tags.remove_if_same(cmd.tag(), &cmd);
                cmd.complete(-1);
            }
        }

        self.rx_cancel.cancel();
        let rx = lock(&self.rx_handle).take();
        if let Some(h) = rx
            && let Err(e) = h.await
        {
            warn!(target = self.target, "Rx worker join failed: {e}");
        }

        self.close_writer().await;
        self.fail_outstanding();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("tx", &self.tx_state.flags())
            .field("rx", &self.rx_state.flags())
            .field("cmd_sn", &self.cmd_sn())
            .field("exp_stat_sn", &self.exp_stat_sn())
            .field("max_cmd_sn", &self.max_cmd_sn())
            .field("tsih", &self.tsih())
            .finish()
    }
}

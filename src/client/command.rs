// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
    },
};

use anyhow::{Result, bail};
use tokio::sync::{Notify, oneshot};

use crate::{
    models::{
        command::{common::TaskAttribute, sense::Sense},
        common::NO_TAG,
        login::common::Stage,
        logout::common::LogoutReason,
    },
    error::InitiatorError,
    sg::SgList,
};

/// Completion hook. Invoked exactly once with the command status
/// (`0` success, `-1` failure).
pub type Callback = Box<dyn FnOnce(i32) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Login,
    Text,
    Scsi,
    Nop,
    Logout,
}

/// State carried between Login rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginArgs {
    pub transit: bool,
    pub cont: bool,
    pub csg: Stage,
    pub nsg: Stage,
    pub isid: [u8; 6],
    pub tsih: u16,
    pub cid: u16,
    pub cmd_sn: u32,
    /// Key=value text for the next request.
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextArgs {
    pub final_bit: bool,
    pub cont: bool,
    pub lun: u64,
    pub transfer_tag: u32,
    pub text: Vec<u8>,
}

impl TextArgs {
    pub fn new(text: Vec<u8>) -> Self {
        Self {
            final_bit: true,
            cont: false,
            lun: 0,
            transfer_tag: NO_TAG,
            text,
        }
    }
}

/// A SCSI task: request fields set by the caller and the result fields the
/// receive path fills in.
#[derive(Debug, Default)]
pub struct ScsiArgs {
    pub lun: u64,
    pub cdb: [u8; 16],
    pub attr: TaskAttribute,
    /// Data flows target → initiator.
    pub input: bool,
    /// Data flows initiator → target.
    pub output: bool,
    /// Expected Data Transfer Length.
    pub trans_len: u32,
    /// Expected read length of a bidirectional command.
    pub bidi_trans_len: u32,
    /// Immediate data length, decided when the command is sent.
    pub length: u32,
    /// Additional header segments, a multiple of 4 bytes.
    pub ahs: Vec<u8>,
    pub send_data: SgList,
    pub recv_data: SgList,

    pub status: u8,
    pub bytes_sent: u32,
    pub bytes_recv: u32,
    pub residual: u32,
    pub sense: Option<Sense>,
}

impl ScsiArgs {
    /// A read of `len` bytes into a flat, zero-filled buffer.
    pub fn read(lun: u64, cdb: [u8; 16], len: u32) -> Self {
        Self {
            lun,
            cdb,
            input: true,
            trans_len: len,
            recv_data: SgList::zeroed(&[len as usize]),
            ..Default::default()
        }
    }

    /// A write of everything in `data`.
    pub fn write(lun: u64, cdb: [u8; 16], data: SgList) -> Self {
        Self {
            lun,
            cdb,
            output: true,
            trans_len: data.total_len() as u32,
            send_data: data,
            ..Default::default()
        }
    }

    /// A command moving no data, e.g. TEST UNIT READY.
    pub fn no_data(lun: u64, cdb: [u8; 16]) -> Self {
        Self {
            lun,
            cdb,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NopArgs {
    pub lun: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutArgs {
    pub reason: LogoutReason,
    pub cid: u16,
    pub response: u8,
    pub time2wait: u16,
    pub time2retain: u16,
}

#[derive(Debug)]
pub enum CommandArgs {
    Login(LoginArgs),
    Text(TextArgs),
    Scsi(Box<ScsiArgs>),
    Nop(NopArgs),
    Logout(LogoutArgs),
}

impl CommandArgs {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Login(_) => CommandKind::Login,
            Self::Text(_) => CommandKind::Text,
            Self::Scsi(_) => CommandKind::Scsi,
            Self::Nop(_) => CommandKind::Nop,
            Self::Logout(_) => CommandKind::Logout,
        }
    }
}

macro_rules! args_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Run `f` on the arguments, failing if the command is of another
        /// kind.
        pub fn $name<R>(&self, f: impl FnOnce(&mut $ty) -> R) -> Result<R> {
            let mut guard = self.args();
            match &mut *guard {
                CommandArgs::$variant(a) => Ok(f(a)),
                other => bail!(
                    "expected a {:?} command, got {:?}",
                    CommandKind::$variant,
                    other.kind()
                ),
            }
        }
    };
}

/// One unit of work moving through the enqueue queue, a session Tx queue,
/// the tag table and the outstanding list.
pub struct Command {
    target: usize,
    kind: CommandKind,
    tag: AtomicU32,
    status: AtomicI32,
    completed: AtomicBool,
    /// Set while an exchange owns the command.
    in_use: AtomicBool,
    tx_done: AtomicBool,
    tx_notify: Notify,
    args: Mutex<CommandArgs>,
    callback: Mutex<Option<Callback>>,
}

impl Command {
    pub fn new(target: usize, args: CommandArgs) -> Arc<Self> {
        Arc::new(Self {
            target,
            kind: args.kind(),
            tag: AtomicU32::new(0),
            status: AtomicI32::new(-1),
            completed: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
            tx_done: AtomicBool::new(false),
            tx_notify: Notify::new(),
            args: Mutex::new(args),
            callback: Mutex::new(None),
        })
    }

    pub fn scsi(target: usize, args: ScsiArgs) -> Arc<Self> {
        Self::new(target, CommandArgs::Scsi(Box::new(args)))
    }

    /// NOP-Out. With `ping == false` the tag stays `0xffffffff`: the target
    /// sends nothing back and the command completes once it is on the wire.
    pub fn nop(target: usize, lun: u64, data: Vec<u8>, ping: bool) -> Arc<Self> {
        let cmd = Self::new(target, CommandArgs::Nop(NopArgs { lun, data }));
        if !ping {
            cmd.set_tag(NO_TAG);
        }
        cmd
    }

    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_tag(&self, tag: u32) {
        self.tag.store(tag, Ordering::SeqCst);
    }

    /// A NOP-Out nobody waits an answer for.
    #[inline]
    pub fn is_unanswered_nop(&self) -> bool {
        self.kind == CommandKind::Nop && self.tag() == NO_TAG
    }

    #[inline]
    pub fn status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Lock the arguments. Never held across an `.await`.
    pub fn args(&self) -> MutexGuard<'_, CommandArgs> {
        self.args.lock().unwrap_or_else(PoisonError::into_inner)
    }

    args_accessor!(with_login, Login, LoginArgs);
    args_accessor!(with_text, Text, TextArgs);
    args_accessor!(with_nop, Nop, NopArgs);
    args_accessor!(with_logout, Logout, LogoutArgs);

    pub fn with_scsi<R>(&self, f: impl FnOnce(&mut ScsiArgs) -> R) -> Result<R> {
        let mut guard = self.args();
        match &mut *guard {
            CommandArgs::Scsi(a) => Ok(f(&mut **a)),
            other => bail!("expected a Scsi command, got {:?}", other.kind()),
        }
    }

    pub fn set_callback(&self, cb: Callback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(cb);
    }

    /// Install a callback that forwards the status into a channel.
    pub fn completion(&self) -> oneshot::Receiver<i32> {
        let (tx, rx) = oneshot::channel();
        self.set_callback(Box::new(move |status| {
            let _ = tx.send(status);
        }));
        rx
    }

    /// Record the final status and fire the callback. Only the first call
    /// has any effect; returns whether this call was it.
    pub fn complete(&self, status: i32) -> bool {
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.status.store(status, Ordering::SeqCst);
        let cb = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cb) = cb {
            cb(status);
        }
        true
    }

    /// Take the command for a new exchange. A finished command is reset
    /// and may be submitted again; one still in flight is refused.
    pub(crate) fn claim(&self) -> Result<(), InitiatorError> {
        if self.in_use.swap(true, Ordering::SeqCst)
            && self
                .completed
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(InitiatorError::InvalidCommand(format!(
                "{:?} command is already in flight",
                self.kind
            )));
        }
        self.completed.store(false, Ordering::SeqCst);
        self.status.store(-1, Ordering::SeqCst);
        self.tx_done.store(false, Ordering::SeqCst);
        if let CommandArgs::Scsi(a) = &mut *self.args() {
            a.status = 0;
            a.bytes_sent = 0;
            a.bytes_recv = 0;
            a.residual = 0;
            a.sense = None;
        }
        Ok(())
    }

    /// Give back a claim whose exchange never started.
    pub(crate) fn unclaim(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }

    pub(crate) fn reset_tx_done(&self) {
        self.tx_done.store(false, Ordering::SeqCst);
    }

    pub(crate) fn mark_tx_done(&self) {
        self.tx_done.store(true, Ordering::SeqCst);
        self.tx_notify.notify_waiters();
    }

    /// Wait until the transmit side has finished writing this command.
    pub(crate) async fn wait_tx_done(&self) {
        loop {
            let notified = self.tx_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.tx_done.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("tag", &format_args!("0x{:08x}", self.tag()))
            .field("status", &self.status())
            .field("completed", &self.is_completed())
            .finish()
    }
}

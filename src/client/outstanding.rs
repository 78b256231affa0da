// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::command::Command;

/// Commands a session has put on the wire and not yet resolved.
#[derive(Debug, Default)]
pub struct Outstanding {
    cmds: Mutex<Vec<Arc<Command>>>,
}

impl Outstanding {
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Command>>> {
        self.cmds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, cmd: Arc<Command>) {
        let mut cmds = self.lock();
        if !cmds.iter().any(|c| Arc::ptr_eq(c, &cmd)) {
            cmds.push(cmd);
        }
    }

    /// Unlink `cmd`; returns whether it was present.
    pub fn remove(&self, cmd: &Arc<Command>) -> bool {
        let mut cmds = self.lock();
        match cmds.iter().position(|c| Arc::ptr_eq(c, cmd)) {
            Some(i) => {
                cmds.swap_remove(i);
                true
            },
            None => false,
        }
    }

    pub fn drain(&self) -> Vec<Arc<Command>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

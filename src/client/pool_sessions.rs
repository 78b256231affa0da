// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{error::InitiatorError, params::Credentials};

/// One reusable session record. The credentials are seeded at start and
/// survive every acquire / release cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSlot {
    pub id: usize,
    pub creds: Credentials,
}

/// Fixed-capacity pool of session records, one per target slot.
#[derive(Debug)]
pub struct SessionPool {
    free: Mutex<VecDeque<PoolSlot>>,
    capacity: usize,
}

impl SessionPool {
    pub fn new(capacity: usize, creds: &Credentials) -> Self {
        let free = (0..capacity)
            .map(|id| PoolSlot {
                id,
                creds: creds.clone(),
            })
            .collect();
        Self {
            free: Mutex::new(free),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PoolSlot>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> Result<PoolSlot, InitiatorError> {
        let slot = self.lock().pop_front().ok_or(InitiatorError::PoolExhausted)?;
        debug!(slot = slot.id, "session record taken from pool");
        Ok(slot)
    }

    pub fn release(&self, slot: PoolSlot) {
        debug!(slot = slot.id, "session record returned to pool");
        let mut free = self.lock();
        if free.len() < self.capacity {
            free.push_back(slot);
        }
    }

    pub fn available(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

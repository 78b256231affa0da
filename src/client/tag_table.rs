// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{client::command::Command, error::InitiatorError, models::common::NO_TAG};

/// First tag handed out after start.
pub const FIRST_TAG: u32 = 0x00ab_c123;

/// Process-wide Initiator Task Tag source. Wraps around and never yields
/// `0xffffffff`.
#[derive(Debug)]
pub struct TagGenerator(AtomicU32);

impl TagGenerator {
    pub fn new(start: u32) -> Self {
        Self(AtomicU32::new(start))
    }

    pub fn next_tag(&self) -> u32 {
        loop {
            let tag = self.0.fetch_add(1, Ordering::SeqCst);
            if tag != NO_TAG {
                return tag;
            }
        }
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new(FIRST_TAG)
    }
}

/// Commands awaiting a response, keyed by Initiator Task Tag.
#[derive(Debug, Default)]
pub struct TagTable {
    map: DashMap<u32, Arc<Command>>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cmd` under `tag`. A tag already in flight is refused rather
    /// than silently replaced.
    pub fn insert(&self, tag: u32, cmd: Arc<Command>) -> Result<(), InitiatorError> {
        if tag == NO_TAG {
            return Err(InitiatorError::InvalidCommand(
                "tag 0xffffffff cannot be registered".into(),
            ));
        }
        match self.map.entry(tag) {
            Entry::Occupied(_) => Err(InitiatorError::DuplicateTag(tag)),
            Entry::Vacant(v) => {
                v.insert(cmd);
                Ok(())
            },
        }
    }

    pub fn remove(&self, tag: u32) -> Option<Arc<Command>> {
        self.map.remove(&tag).map(|(_, cmd)| cmd)
    }

    /// Remove `tag` only while it still maps to `cmd`.
    pub fn remove_if_same(&self, tag: u32, cmd: &Arc<Command>) -> Option<Arc<Command>> {
        self.map
            .remove_if(&tag, |_, v| Arc::ptr_eq(v, cmd))
            .map(|(_, c)| c)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.map.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

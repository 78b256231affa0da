// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Run one socket operation bounded by `io_timeout`, giving up early when
/// `cancel` fires.
pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context(label)),
                Err(_) => Err(anyhow!("{label} timeout")),
            }
        }
    }
}

/// Wait for a command completion, bounded by `limit`. `None` on timeout.
pub(crate) async fn wait_status(
    done: tokio::sync::oneshot::Receiver<i32>,
    limit: Duration,
) -> Result<Option<i32>> {
    match timeout(limit, done).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(_)) => Err(anyhow!("command dropped before completion")),
        Err(_) => Ok(None),
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;
use slog::{info, Logger};

/// The CI token store (spec §5): an in-memory map from random tokens to the
/// repository they grant write access to, with a default TTL. Guarded by its
/// own mutex rather than folded into `GcLock` or the DB -- it's process-wide
/// state with a lifecycle of its own, not a data-layer concern.
pub struct CiTokenStore {
    tokens: Mutex<HashMap<String, (i32, Instant)>>,
    ttl: Duration,
}

impl CiTokenStore {
    pub fn new(ttl: Duration) -> Self {
        CiTokenStore {
            tokens: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Mints a new token scoped to `repository_id`, valid until the TTL
    /// elapses.
    pub fn issue(&self, repository_id: i32) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), (repository_id, Instant::now() + self.ttl));
        token
    }

    /// Returns the repository a (still-live) token grants access to.
    pub fn validate(&self, token: &str) -> Option<i32> {
        let tokens = self.tokens.lock().unwrap();
        tokens.get(token).and_then(|(repo_id, expires_at)| {
            if Instant::now() < *expires_at {
                Some(*repo_id)
            } else {
                None
            }
        })
    }

    fn sweep(&self) -> usize {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        let now = Instant::now();
        tokens.retain(|_, (_, expires_at)| now < *expires_at);
        before - tokens.len()
    }
}

/// Spawns the background sweeper that evicts expired tokens on a fixed
/// interval, for the life of the process.
pub fn spawn_sweeper(
    store: std::sync::Arc<CiTokenStore>,
    interval: Duration,
    logger: Logger,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = store.sweep();
            if evicted > 0 {
                info!(logger, "swept expired CI tokens"; "evicted" => evicted);
            }
        }
    })
}

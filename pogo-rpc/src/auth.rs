/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use async_trait::async_trait;
use pogo_types::PogoError;

/// Resolves an opaque `auth_token` carried on every RPC into a caller
/// identity, scoped to the repository the call targets. Left as a trait
/// object here rather than baked into `PogoServer` so the root-token /
/// CI-token bootstrapping (spec §5/§6.6) can live where the rest of the
/// process-wide state does, in the server binary.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve(&self, auth_token: &str, repository_id: i32) -> Result<String, PogoError>;
}

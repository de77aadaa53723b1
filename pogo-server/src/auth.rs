/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::sync::Arc;

use async_trait::async_trait;
use metastore::MetaStore;
use pogo_types::PogoError;
use pogo_rpc::AuthResolver;

use crate::ci_tokens::CiTokenStore;

/// Resolves an `auth_token` into a caller identity (spec §5/§6.6). Three
/// kinds of token are accepted, checked in order: the root bootstrap token
/// (full access to every repository), a CI-issued token (scoped to the
/// repository it was minted for), and otherwise the token is taken to be
/// the caller's username directly, checked against `access_grants` -- the
/// spec defines no separate credential exchange, so the token *is* the
/// identity once the first two checks miss.
pub struct ServerAuth {
    meta: Arc<MetaStore>,
    root_token: Option<String>,
    ci_tokens: Arc<CiTokenStore>,
}

impl ServerAuth {
    pub fn new(meta: Arc<MetaStore>, root_token: Option<String>, ci_tokens: Arc<CiTokenStore>) -> Self {
        ServerAuth {
            meta,
            root_token,
            ci_tokens,
        }
    }
}

#[async_trait]
impl AuthResolver for ServerAuth {
    async fn resolve(&self, auth_token: &str, repository_id: i32) -> Result<String, PogoError> {
        if auth_token.is_empty() {
            return Err(PogoError::auth("missing auth token"));
        }

        if let Some(root_token) = &self.root_token {
            if auth_token == root_token {
                return Ok("root".to_string());
            }
        }

        if let Some(scoped_repo) = self.ci_tokens.validate(auth_token) {
            if repository_id == 0 || scoped_repo == repository_id {
                return Ok(format!("ci:{scoped_repo}"));
            }
            return Err(PogoError::access_denied(
                "CI token is not scoped to this repository",
            ));
        }

        // Repository-unscoped calls (Init, GarbageCollect) only need a
        // token at all, not access to a specific repository.
        if repository_id == 0 {
            return Ok(auth_token.to_string());
        }

        let can_write = self
            .meta
            .check_user_repository_access(repository_id, auth_token)
            .await?;
        if can_write {
            Ok(auth_token.to_string())
        } else {
            Err(PogoError::access_denied(format!(
                "{auth_token} has no write access to this repository"
            )))
        }
    }
}

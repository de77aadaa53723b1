/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! Relational persistence for repositories, changes, files, and bookmarks
//! (spec §4.3). Backed by SQLite via `diesel` + `r2d2`; the schema is kept
//! portable (plain SQL types, no SQLite-specific features) so a Postgres
//! backend is a `DATABASE_URL` change away, not a rewrite.

mod error;
mod models;
mod schema;
mod store;

pub use error::MetaStoreError;
pub use models::{AccessGrantRow, BookmarkRow, ChangeRow, CiRunRow, FileRow, RepositoryRow};
pub use store::MetaStore;

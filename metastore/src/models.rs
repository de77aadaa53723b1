/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = repositories)]
pub struct RepositoryRow {
    pub id: i32,
    pub name: String,
    pub public: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = repositories)]
pub struct NewRepository<'a> {
    pub name: &'a str,
    pub public: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = changes, primary_key(row_id))]
pub struct ChangeRow {
    pub row_id: i32,
    pub repository_id: i32,
    pub change_id: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = changes)]
pub struct NewChange<'a> {
    pub repository_id: i32,
    pub change_id: &'a str,
    pub description: Option<&'a str>,
    pub author: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = change_parents)]
pub struct ChangeParentRow {
    pub change_row_id: i32,
    pub parent_row_id: i32,
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = files)]
pub struct FileRow {
    pub id: i32,
    pub name: String,
    pub executable: bool,
    pub content_hash: String,
    pub binary: bool,
    pub encoding: String,
    pub bom: bool,
    pub line_ending: String,
}

#[derive(Insertable)]
#[diesel(table_name = files)]
pub struct NewFile<'a> {
    pub name: &'a str,
    pub executable: bool,
    pub content_hash: &'a str,
    pub binary: bool,
    pub encoding: &'a str,
    pub bom: bool,
    pub line_ending: &'a str,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = change_files)]
pub struct ChangeFileRow {
    pub change_row_id: i32,
    pub file_id: i32,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = bookmarks)]
pub struct BookmarkRow {
    pub repository_id: i32,
    pub name: String,
    pub change_row_id: i32,
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = access_grants)]
pub struct AccessGrantRow {
    pub repository_id: i32,
    pub user: String,
    pub can_write: bool,
}

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = ci_runs)]
pub struct CiRunRow {
    pub id: i32,
    pub repository_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = ci_runs)]
pub struct NewCiRun {
    pub repository_id: i32,
    pub created_at: NaiveDateTime,
}

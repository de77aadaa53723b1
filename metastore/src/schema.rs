/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

diesel::table! {
    repositories (id) {
        id -> Integer,
        name -> Text,
        public -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    changes (row_id) {
        row_id -> Integer,
        repository_id -> Integer,
        change_id -> Text,
        description -> Nullable<Text>,
        author -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    change_parents (change_row_id, parent_row_id) {
        change_row_id -> Integer,
        parent_row_id -> Integer,
    }
}

diesel::table! {
    files (id) {
        id -> Integer,
        name -> Text,
        executable -> Bool,
        content_hash -> Text,
        binary -> Bool,
        encoding -> Text,
        bom -> Bool,
        line_ending -> Text,
    }
}

diesel::table! {
    change_files (change_row_id, file_id) {
        change_row_id -> Integer,
        file_id -> Integer,
    }
}

diesel::table! {
    bookmarks (repository_id, name) {
        repository_id -> Integer,
        name -> Text,
        change_row_id -> Integer,
    }
}

diesel::table! {
    access_grants (repository_id, user) {
        repository_id -> Integer,
        user -> Text,
        can_write -> Bool,
    }
}

diesel::table! {
    ci_runs (id) {
        id -> Integer,
        repository_id -> Integer,
        created_at -> Timestamp,
    }
}

diesel::joinable!(changes -> repositories (repository_id));
diesel::joinable!(change_files -> changes (change_row_id));
diesel::joinable!(change_files -> files (file_id));
diesel::joinable!(bookmarks -> repositories (repository_id));
diesel::joinable!(bookmarks -> changes (change_row_id));
diesel::joinable!(ci_runs -> repositories (repository_id));

diesel::allow_tables_to_appear_in_same_query!(
    repositories,
    changes,
    change_parents,
    files,
    change_files,
    bookmarks,
    access_grants,
    ci_runs,
);

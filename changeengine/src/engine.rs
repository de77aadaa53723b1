/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use metastore::{ChangeRow, MetaStore, RepositoryRow};
use objectstore::ObjectStore;
use pogo_types::{ContentHash, FileType};
use slog::{info, o, warn, Logger};

use crate::diff::{diff_binary, diff_text, DiffAlgorithm, FileDiff, FileStatus};
use crate::error::ChangeEngineError;
use crate::ignore_rules::IgnoreRules;
use crate::merge::three_way_merge;

/// A file as received over the push RPC, already assembled from its
/// streamed (header, content, EOF) triples.
pub struct PushedFile {
    pub name: String,
    pub executable: bool,
    pub content: Bytes,
}

/// A file as delivered to the client during `edit`, in its original
/// encoding and line ending.
pub struct EditedFile {
    pub name: String,
    pub executable: bool,
    pub content: Bytes,
    pub file_type: FileType,
}

#[derive(Clone)]
struct FileVersion {
    content_hash: String,
    executable: bool,
    file_type: FileType,
}

/// Push/new/edit/bookmark/diff with readonly enforcement, ignore-rule
/// evaluation, and three-way merge. Takes its dependencies by reference
/// rather than holding global state, matching the teacher's
/// `RepoContext`-takes-its-dependencies pattern.
pub struct ChangeEngine {
    meta: Arc<MetaStore>,
    objects: Arc<dyn ObjectStore>,
    logger: Logger,
}

impl ChangeEngine {
    pub fn new(meta: Arc<MetaStore>, objects: Arc<dyn ObjectStore>, logger: Logger) -> Self {
        ChangeEngine {
            meta,
            objects,
            logger,
        }
    }

    pub async fn init(
        &self,
        repo_name: &str,
        public: bool,
    ) -> Result<(RepositoryRow, ChangeRow), ChangeEngineError> {
        let repo = self.meta.create_repository(repo_name, public).await?;
        let root = self
            .meta
            .create_change(repo.id, None, None, vec![])
            .await?;
        info!(self.logger, "initialized repository"; "repo" => repo_name, "root" => &root.change_id);
        Ok((repo, root))
    }

    pub async fn resolve(
        &self,
        repository_id: i32,
        query: &str,
    ) -> Result<ChangeRow, ChangeEngineError> {
        Ok(self
            .meta
            .find_change_by_name_fuzzy(repository_id, query)
            .await?)
    }

    /// Pushes a full file set to `change_id`. Files not present in `files`
    /// are implicitly removed from the change's association set.
    pub async fn push(
        &self,
        repository_id: i32,
        change_id: &str,
        caller: &str,
        files: Vec<PushedFile>,
        force: bool,
    ) -> Result<(), ChangeEngineError> {
        let log = self.logger.new(o!("op" => "push", "change" => change_id.to_string()));
        let change = self.meta.get_change(repository_id, change_id).await?;
        self.enforce_writable(&change, caller, force).await?;

        let ignore_rules = build_ignore_rules(&files);
        let mut pushed_names = HashSet::new();

        for file in files {
            if file.name == ".pogoignore" {
                // Still tracked as a regular file, just never itself ignored.
            } else if ignore_rules.is_ignored(&file.name, false) {
                continue;
            }

            let sample_len = file.content.len().min(filetyper::SAMPLE_SIZE);
            let file_type = filetyper::detect(&file.content[..sample_len], file.content.len() as u64)?;

            let canonical = if file_type.binary {
                file.content.to_vec()
            } else {
                filetyper::canonicalize_bytes(
                    &file.content,
                    file_type.encoding,
                    file_type.bom,
                    file_type.binary,
                )?
            };

            let hash = self.objects.put_bytes(Bytes::from(canonical)).await?;
            let file_id = self
                .meta
                .upsert_file(&file.name, file.executable, &hash.to_string(), file_type)
                .await?;
            self.meta.add_file_to_change(change.row_id, file_id).await?;
            pushed_names.insert(file.name);
        }

        let existing = self.meta.get_files_for_change(change.row_id).await?;
        for (row, _ft) in existing {
            if !pushed_names.contains(&row.name) {
                self.meta
                    .remove_file_from_change(change.row_id, row.id)
                    .await?;
            }
        }

        info!(log, "push complete"; "files" => pushed_names.len());
        Ok(())
    }

    /// Creates a new change with the given parents (by fuzzy name; empty
    /// defaults to the caller's current change, resolved by the RPC layer
    /// before calling in).
    pub async fn new_change(
        &self,
        repository_id: i32,
        description: Option<String>,
        author: String,
        parent_queries: Vec<String>,
    ) -> Result<ChangeRow, ChangeEngineError> {
        let mut parents = Vec::new();
        for q in &parent_queries {
            parents.push(self.resolve(repository_id, q).await?);
        }
        let parent_ids: Vec<String> = parents.iter().map(|p| p.change_id.clone()).collect();

        let new_change = self
            .meta
            .create_change(repository_id, description, Some(author), parent_ids)
            .await?;

        match parents.len() {
            0 => {}
            1 => {
                self.meta
                    .copy_change_files(parents[0].row_id, new_change.row_id)
                    .await?;
            }
            _ => {
                let merged = self
                    .merge_parents(repository_id, &parents, &new_change.change_id)
                    .await?;
                for (name, version) in merged {
                    let file_type = version.file_type;
                    let file_id = self
                        .meta
                        .upsert_file(&name, version.executable, &version.content_hash, file_type)
                        .await?;
                    self.meta
                        .add_file_to_change(new_change.row_id, file_id)
                        .await?;
                }
            }
        }

        Ok(new_change)
    }

    /// Removes a change outright, per spec.md §6.1's `Rm`. Refuses a change
    /// with children regardless of `force`, since deleting it would leave
    /// those children's parent edges dangling; `force` only bypasses the
    /// ordinary readonly check (bookmark/author-mismatch).
    pub async fn rm(
        &self,
        repository_id: i32,
        query: &str,
        caller: &str,
        force: bool,
    ) -> Result<(), ChangeEngineError> {
        let change = self.resolve(repository_id, query).await?;
        let children = self.meta.get_change_children(change.row_id).await?;
        if !children.is_empty() {
            return Err(ChangeEngineError::HasChildren(change.change_id));
        }
        self.enforce_writable(&change, caller, force).await?;
        self.meta.delete_change(change.row_id).await?;
        Ok(())
    }

    pub async fn set_bookmark(
        &self,
        repository_id: i32,
        name: &str,
        change_row_id: i32,
    ) -> Result<(), ChangeEngineError> {
        Ok(self
            .meta
            .set_bookmark(repository_id, name, change_row_id)
            .await?)
    }

    pub async fn remove_bookmark(
        &self,
        repository_id: i32,
        name: &str,
    ) -> Result<(), ChangeEngineError> {
        Ok(self.meta.remove_bookmark(repository_id, name).await?)
    }

    pub async fn list_bookmarks(
        &self,
        repository_id: i32,
    ) -> Result<Vec<(String, ChangeRow)>, ChangeEngineError> {
        Ok(self.meta.list_bookmarks(repository_id).await?)
    }

    /// Streams every file in `change` back in its original encoding and
    /// line ending.
    pub async fn edit(&self, change_row_id: i32) -> Result<Vec<EditedFile>, ChangeEngineError> {
        let files = self.meta.get_files_for_change(change_row_id).await?;
        let mut out = Vec::with_capacity(files.len());
        for (row, file_type) in files {
            let hash = parse_hash(&row.content_hash)?;
            let (canonical, _mime) = self.objects.open(&hash).await?;
            let restored = if file_type.binary {
                canonical
            } else {
                Bytes::from(filetyper::type_bytes(
                    &canonical,
                    file_type.encoding,
                    file_type.bom,
                    file_type.line_ending,
                    file_type.binary,
                )?)
            };
            out.push(EditedFile {
                name: row.name,
                executable: row.executable,
                content: restored,
                file_type,
            });
        }
        Ok(out)
    }

    /// Diffs two changes' file sets file-by-file.
    pub async fn diff(
        &self,
        from_row_id: i32,
        to_row_id: i32,
        algorithm: DiffAlgorithm,
        allow_large: bool,
    ) -> Result<Vec<FileDiff>, ChangeEngineError> {
        let from_files = self.meta.get_files_for_change(from_row_id).await?;
        let to_files = self.meta.get_files_for_change(to_row_id).await?;
        let from_map: HashMap<_, _> = from_files
            .into_iter()
            .map(|(row, ft)| (row.name.clone(), (row, ft)))
            .collect();
        let to_map: HashMap<_, _> = to_files
            .into_iter()
            .map(|(row, ft)| (row.name.clone(), (row, ft)))
            .collect();

        let mut names: Vec<_> = from_map.keys().chain(to_map.keys()).cloned().collect();
        names.sort();
        names.dedup();

        let mut diffs = Vec::new();
        for name in names {
            match (from_map.get(&name), to_map.get(&name)) {
                (None, Some(_)) => diffs.push(diff_binary(&name, FileStatus::Added)),
                (Some(_), None) => diffs.push(diff_binary(&name, FileStatus::Removed)),
                (Some((from_row, from_ft)), Some((to_row, to_ft))) => {
                    if from_row.content_hash == to_row.content_hash {
                        continue;
                    }
                    if from_ft.binary || to_ft.binary {
                        diffs.push(diff_binary(&name, FileStatus::Binary));
                        continue;
                    }
                    let from_hash = parse_hash(&from_row.content_hash)?;
                    let to_hash = parse_hash(&to_row.content_hash)?;
                    let (from_bytes, _) = self.objects.open(&from_hash).await?;
                    let (to_bytes, _) = self.objects.open(&to_hash).await?;
                    let from_text = String::from_utf8_lossy(&from_bytes);
                    let to_text = String::from_utf8_lossy(&to_bytes);
                    diffs.push(diff_text(&name, &from_text, &to_text, algorithm, allow_large));
                }
                (None, None) => unreachable!(),
            }
        }
        Ok(diffs)
    }

    /// Diffs a change against a set of files held locally by the client
    /// rather than another committed change, for the interactive
    /// `DiffLocal` RPC (spec.md §6.1).
    pub async fn diff_local(
        &self,
        change_row_id: i32,
        local_files: Vec<PushedFile>,
        algorithm: DiffAlgorithm,
        allow_large: bool,
    ) -> Result<Vec<FileDiff>, ChangeEngineError> {
        let committed = self.meta.get_files_for_change(change_row_id).await?;
        let committed_map: HashMap<_, _> = committed
            .into_iter()
            .map(|(row, ft)| (row.name.clone(), (row, ft)))
            .collect();
        let local_map: HashMap<String, PushedFile> =
            local_files.into_iter().map(|f| (f.name.clone(), f)).collect();

        let mut names: Vec<_> = committed_map.keys().chain(local_map.keys()).cloned().collect();
        names.sort();
        names.dedup();

        let mut diffs = Vec::new();
        for name in names {
            match (committed_map.get(&name), local_map.get(&name)) {
                (None, Some(_)) => diffs.push(diff_binary(&name, FileStatus::Added)),
                (Some(_), None) => diffs.push(diff_binary(&name, FileStatus::Removed)),
                (Some((row, ft)), Some(local)) => {
                    let hash = parse_hash(&row.content_hash)?;
                    let (committed_bytes, _) = self.objects.open(&hash).await?;

                    let sample_len = local.content.len().min(filetyper::SAMPLE_SIZE);
                    let local_type =
                        filetyper::detect(&local.content[..sample_len], local.content.len() as u64)?;

                    if ft.binary || local_type.binary {
                        if committed_bytes == local.content {
                            continue;
                        }
                        diffs.push(diff_binary(&name, FileStatus::Binary));
                        continue;
                    }

                    let canonical_local = filetyper::canonicalize_bytes(
                        &local.content,
                        local_type.encoding,
                        local_type.bom,
                        local_type.binary,
                    )?;
                    if canonical_local == committed_bytes.to_vec() {
                        continue;
                    }
                    let from_text = String::from_utf8_lossy(&committed_bytes);
                    let to_text = String::from_utf8_lossy(&canonical_local);
                    diffs.push(diff_text(&name, &from_text, &to_text, algorithm, allow_large));
                }
                (None, None) => unreachable!(),
            }
        }
        Ok(diffs)
    }

    async fn enforce_writable(
        &self,
        change: &ChangeRow,
        caller: &str,
        force: bool,
    ) -> Result<(), ChangeEngineError> {
        if force {
            return Ok(());
        }
        if self.meta.is_readonly(change.row_id, caller).await? {
            return Err(ChangeEngineError::Readonly(change.change_id.clone()));
        }
        Ok(())
    }

    /// Merges more than two parents by pairwise folding: the first pair
    /// uses a real merge base (nearest common ancestor) for three-way
    /// textual merge; any additional parent folds in without a base, so
    /// conflicting versions always fall back to sibling conflict files
    /// (spec.md §4.4.4's "otherwise embeds both versions").
    async fn merge_parents(
        &self,
        repository_id: i32,
        parents: &[ChangeRow],
        conflict_suffix: &str,
    ) -> Result<HashMap<String, FileVersion>, ChangeEngineError> {
        let mut per_parent_files = Vec::with_capacity(parents.len());
        for p in parents {
            per_parent_files.push(self.file_version_map(p.row_id).await?);
        }

        let base_map = if parents.len() == 2 {
            match self
                .find_merge_base(repository_id, parents[0].row_id, parents[1].row_id)
                .await?
            {
                Some(base_row_id) => Some(self.file_version_map(base_row_id).await?),
                None => None,
            }
        } else {
            None
        };

        let mut acc = per_parent_files[0].clone();
        for (idx, next) in per_parent_files.iter().enumerate().skip(1) {
            let base_for_this_fold = if idx == 1 { base_map.as_ref() } else { None };
            acc = self
                .merge_two(acc, next.clone(), base_for_this_fold, conflict_suffix)
                .await?;
        }
        Ok(acc)
    }

    async fn file_version_map(
        &self,
        change_row_id: i32,
    ) -> Result<HashMap<String, FileVersion>, ChangeEngineError> {
        let files = self.meta.get_files_for_change(change_row_id).await?;
        Ok(files
            .into_iter()
            .map(|(row, ft)| {
                (
                    row.name,
                    FileVersion {
                        content_hash: row.content_hash,
                        executable: row.executable,
                        file_type: ft,
                    },
                )
            })
            .collect())
    }

    async fn merge_two(
        &self,
        a: HashMap<String, FileVersion>,
        b: HashMap<String, FileVersion>,
        base: Option<&HashMap<String, FileVersion>>,
        conflict_suffix: &str,
    ) -> Result<HashMap<String, FileVersion>, ChangeEngineError> {
        let names: HashSet<String> = a.keys().chain(b.keys()).cloned().collect();
        let mut out = HashMap::new();

        for name in names {
            match (a.get(&name), b.get(&name)) {
                (Some(v), None) | (None, Some(v)) => {
                    out.insert(name, v.clone());
                }
                (Some(av), Some(bv)) => {
                    if av.content_hash == bv.content_hash {
                        out.insert(name, av.clone());
                        continue;
                    }
                    let base_version = base.and_then(|b| b.get(&name));
                    match self
                        .resolve_conflict(&name, av, bv, base_version, conflict_suffix)
                        .await?
                    {
                        ConflictResolution::Merged(v) => {
                            out.insert(name, v);
                        }
                        ConflictResolution::Siblings(a_entry, b_entry) => {
                            out.insert(format!("{name}.conflict-a-{conflict_suffix}"), a_entry);
                            out.insert(format!("{name}.conflict-b-{conflict_suffix}"), b_entry);
                        }
                    }
                }
                (None, None) => unreachable!(),
            }
        }
        Ok(out)
    }

    async fn resolve_conflict(
        &self,
        name: &str,
        a: &FileVersion,
        b: &FileVersion,
        base: Option<&FileVersion>,
        conflict_suffix: &str,
    ) -> Result<ConflictResolution, ChangeEngineError> {
        let base = match base {
            Some(base) if !a.file_type.binary && !b.file_type.binary && !base.file_type.binary => {
                base
            }
            _ => return Ok(ConflictResolution::Siblings(a.clone(), b.clone())),
        };

        let base_hash: ContentHash = match base.content_hash.parse() {
            Ok(h) => h,
            Err(_) => return Ok(ConflictResolution::Siblings(a.clone(), b.clone())),
        };
        let a_hash = parse_hash(&a.content_hash)?;
        let b_hash = parse_hash(&b.content_hash)?;

        let (base_bytes, _) = self.objects.open(&base_hash).await?;
        let (a_bytes, _) = self.objects.open(&a_hash).await?;
        let (b_bytes, _) = self.objects.open(&b_hash).await?;

        let (base_text, a_text, b_text) = match (
            std::str::from_utf8(&base_bytes),
            std::str::from_utf8(&a_bytes),
            std::str::from_utf8(&b_bytes),
        ) {
            (Ok(base), Ok(a_t), Ok(b_t)) => (base, a_t, b_t),
            _ => {
                warn!(self.logger, "conflict bytes were not valid utf-8 despite text FileType"; "file" => name);
                return Ok(ConflictResolution::Siblings(a.clone(), b.clone()));
            }
        };

        let merged = three_way_merge(base_text, a_text, b_text);
        let merged_file_type = FileType::three_way_merge(&base.file_type, &a.file_type, &b.file_type);
        let hash = self
            .objects
            .put_bytes(Bytes::from(merged.text.into_bytes()))
            .await?;
        Ok(ConflictResolution::Merged(FileVersion {
            content_hash: hash.to_string(),
            executable: a.executable || b.executable,
            file_type: merged_file_type,
        }))
    }

    /// BFS-based nearest common ancestor of two changes. Not guaranteed
    /// minimal in pathological non-tree DAGs, but exact for the
    /// tree-shaped histories `new` produces in practice.
    async fn find_merge_base(
        &self,
        _repository_id: i32,
        a_row_id: i32,
        b_row_id: i32,
    ) -> Result<Option<i32>, ChangeEngineError> {
        let ancestors_a = self.ancestors_with_distance(a_row_id).await?;

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(b_row_id);
        seen.insert(b_row_id);
        if ancestors_a.contains_key(&b_row_id) {
            return Ok(Some(b_row_id));
        }
        while let Some(row_id) = queue.pop_front() {
            let parents = self.meta.get_change_parents(row_id).await?;
            for parent in parents {
                if ancestors_a.contains_key(&parent.row_id) {
                    return Ok(Some(parent.row_id));
                }
                if seen.insert(parent.row_id) {
                    queue.push_back(parent.row_id);
                }
            }
        }
        Ok(None)
    }

    async fn ancestors_with_distance(
        &self,
        start: i32,
    ) -> Result<HashMap<i32, usize>, ChangeEngineError> {
        let mut distances = HashMap::new();
        distances.insert(start, 0usize);
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(row_id) = queue.pop_front() {
            let dist = distances[&row_id];
            let parents = self.meta.get_change_parents(row_id).await?;
            for parent in parents {
                if !distances.contains_key(&parent.row_id) {
                    distances.insert(parent.row_id, dist + 1);
                    queue.push_back(parent.row_id);
                }
            }
        }
        Ok(distances)
    }
}

enum ConflictResolution {
    Merged(FileVersion),
    Siblings(FileVersion, FileVersion),
}

fn parse_hash(raw: &str) -> Result<ContentHash, ChangeEngineError> {
    raw.parse()
        .map_err(|_| ChangeEngineError::CorruptData(raw.to_string()))
}

fn build_ignore_rules(files: &[PushedFile]) -> IgnoreRules {
    let mut pogoignores = Vec::new();
    for file in files {
        if let Some(dir) = file.name.strip_suffix("/.pogoignore").or_else(|| {
            if file.name == ".pogoignore" {
                Some("")
            } else {
                None
            }
        }) {
            if let Ok(text) = std::str::from_utf8(&file.content) {
                pogoignores.push((dir.to_string(), text.to_string()));
            }
        }
    }
    IgnoreRules::build(&pogoignores)
}

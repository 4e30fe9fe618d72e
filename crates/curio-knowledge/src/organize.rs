// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge base maintenance: consolidate files whose themes collide.
//!
//! Works from a snapshot so it can run while updates are being served.
//! Every group merge re-checks revisions under the topic locks before
//! publishing; a group that changed underneath is skipped, not forced.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use curio_core::{CurioError, cosine_similarity};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manager::KnowledgeManager;
use crate::store::{KnowledgeUnit, StoredFile, TopicGuard, topic_slug};

/// One consolidation performed by organize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeRecord {
    pub theme: String,
    pub target_topic: String,
    pub merged_topics: Vec<String>,
    pub units_before: usize,
    pub units_after: usize,
}

/// Summary of an organize pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizeReport {
    pub files_analyzed: usize,
    pub themes_identified: usize,
    pub merges: Vec<MergeRecord>,
    pub duplicate_units_removed: usize,
    /// Files with no meaningful content. Reported, never deleted.
    pub empty_files: Vec<PathBuf>,
    pub conflicts_skipped: usize,
}

impl KnowledgeManager {
    /// Groups knowledge files by theme and consolidates each group into one file.
    ///
    /// Also collapses near-duplicate units inside single files. Publishes
    /// each rewritten file atomically and refreshes the index once at the end.
    pub async fn organize_knowledge_base(&self) -> Result<OrganizeReport, CurioError> {
        let snapshot = self.store.snapshot().await?;
        let mut report = OrganizeReport {
            files_analyzed: snapshot.len(),
            ..OrganizeReport::default()
        };

        let mut themes = Vec::with_capacity(snapshot.len());
        for stored in &snapshot {
            if stored.file.units.is_empty()
                || stored.file.content_chars() < self.config.min_file_chars
            {
                report.empty_files.push(stored.path.clone());
            }
            themes.push(self.determine_file_theme(stored).await);
        }
        report.themes_identified = themes
            .iter()
            .map(|t| topic_slug(t))
            .collect::<BTreeSet<_>>()
            .len();

        let groups = self.merge_similar_files(&snapshot, &themes).await?;
        let mut changed = false;

        for group in groups {
            let outcome = if group.len() > 1 {
                self.consolidate(&snapshot, &group, &themes[group[0]]).await
            } else {
                self.dedup_single(&snapshot[group[0]]).await.map(|removed| {
                    (None, removed)
                })
            };
            match outcome {
                Ok((record, removed)) => {
                    changed |= record.is_some() || removed > 0;
                    report.duplicate_units_removed += removed;
                    report.merges.extend(record);
                }
                Err(CurioError::MergeConflict { topic, .. }) => {
                    warn!(topic = %topic, "knowledge file changed during organize, skipping group");
                    report.conflicts_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if changed {
            self.request_refresh().await;
        }
        info!(
            files = report.files_analyzed,
            themes = report.themes_identified,
            merges = report.merges.len(),
            duplicates = report.duplicate_units_removed,
            "knowledge base organized"
        );
        Ok(report)
    }

    /// A short theme label for one file. Falls back to the file's topic.
    pub async fn determine_file_theme(&self, stored: &StoredFile) -> String {
        let sample: String = stored
            .file
            .text()
            .chars()
            .take(self.config.theme_sample_chars)
            .collect();
        let prompt = format!(
            "Name the overall theme of this knowledge file in one to four words. \
             Reply with the theme only.\n\nTopic: {topic}\n\nContent sample:\n{sample}",
            topic = stored.file.topic,
        );

        match self.complete("file_theme", prompt, 32).await {
            Ok(reply) => {
                let theme = reply
                    .lines()
                    .map(|l| l.trim().trim_matches(|c| c == '"' || c == '.' || c == '*'))
                    .find(|l| !l.is_empty());
                match theme {
                    Some(theme) => theme.to_string(),
                    None => stored.file.topic.clone(),
                }
            }
            Err(e) => {
                warn!(topic = %stored.file.topic, error = %e, "theme detection failed, using topic");
                stored.file.topic.clone()
            }
        }
    }

    /// Partitions files into groups whose themes match by slug or by
    /// embedding similarity at or above `organize_merge_threshold`.
    ///
    /// Returns index groups into `files`, each sorted ascending.
    pub async fn merge_similar_files(
        &self,
        files: &[StoredFile],
        themes: &[String],
    ) -> Result<Vec<Vec<usize>>, CurioError> {
        let n = files.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let vectors = self.embed_all(themes.to_vec()).await?;
        let slugs: Vec<String> = themes.iter().map(|t| topic_slug(t)).collect();

        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            parent[i] = root;
            root
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let collide = slugs[i] == slugs[j]
                    || cosine_similarity(&vectors[i], &vectors[j])
                        >= self.config.organize_merge_threshold;
                if collide {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[b.max(a)] = a.min(b);
                    }
                }
            }
        }

        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut root_slot = vec![usize::MAX; n];
        for i in 0..n {
            let root = find(&mut parent, i);
            if root_slot[root] == usize::MAX {
                root_slot[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[root_slot[root]].push(i);
        }
        Ok(groups)
    }

    /// Merges every file in `group` into the one with the most units.
    async fn consolidate(
        &self,
        snapshot: &[StoredFile],
        group: &[usize],
        theme: &str,
    ) -> Result<(Option<MergeRecord>, usize), CurioError> {
        let members: Vec<&StoredFile> = group.iter().map(|&i| &snapshot[i]).collect();
        let target = members
            .iter()
            .max_by(|a, b| {
                a.file
                    .units
                    .len()
                    .cmp(&b.file.units.len())
                    .then_with(|| b.file.topic.cmp(&a.file.topic))
            })
            .copied()
            .ok_or_else(|| CurioError::Internal("empty merge group".into()))?;

        let guards = self.lock_all(&members).await;
        for member in &members {
            let current = self.store.load(&member.file.topic).await?.map(|f| f.revision);
            if current != Some(member.file.revision) {
                return Err(CurioError::MergeConflict {
                    topic: member.file.topic.clone(),
                    expected: member.file.revision,
                    found: current.unwrap_or(0),
                });
            }
        }

        let units_before: usize = members.iter().map(|m| m.file.units.len()).sum();
        let mut units: Vec<KnowledgeUnit> = target.file.units.clone();
        for member in members.iter().filter(|m| m.path != target.path) {
            units.extend(member.file.units.iter().cloned().map(|mut u| {
                u.topic = target.file.topic.clone();
                u
            }));
        }
        let units = self.dedup_units(units).await?;
        let units_after = units.len();

        let mut merged = target.file.clone();
        merged.units = units;
        merged.updated_at = Utc::now();
        let target_guard = guard_for(&guards, &target.file.topic)?;
        self.store
            .replace(target_guard, Some(target.file.revision), merged)
            .await?;

        let mut merged_topics = Vec::new();
        for member in members.iter().filter(|m| m.path != target.path) {
            let guard = guard_for(&guards, &member.file.topic)?;
            self.store
                .remove(guard, &member.file.topic, member.file.revision)
                .await?;
            merged_topics.push(member.file.topic.clone());
        }

        debug!(target = %target.file.topic, ?merged_topics, units_before, units_after, "files consolidated");
        Ok((
            Some(MergeRecord {
                theme: theme.to_string(),
                target_topic: target.file.topic.clone(),
                merged_topics,
                units_before,
                units_after,
            }),
            units_before - units_after,
        ))
    }

    /// Collapses near-duplicate units within one file.
    async fn dedup_single(&self, stored: &StoredFile) -> Result<usize, CurioError> {
        if stored.file.units.len() < 2 {
            return Ok(0);
        }
        let units = self.dedup_units(stored.file.units.clone()).await?;
        let removed = stored.file.units.len() - units.len();
        if removed == 0 {
            return Ok(0);
        }

        let guard = self.store.lock_topic(&stored.file.topic).await;
        let mut file = stored.file.clone();
        file.units = units;
        file.updated_at = Utc::now();
        self.store
            .replace(&guard, Some(stored.file.revision), file)
            .await?;
        Ok(removed)
    }

    /// Keeps units in order, dropping any at or above `duplicate_threshold`
    /// to one already kept.
    async fn dedup_units(
        &self,
        units: Vec<KnowledgeUnit>,
    ) -> Result<Vec<KnowledgeUnit>, CurioError> {
        if units.len() < 2 {
            return Ok(units);
        }
        let vectors = self
            .embed_all(units.iter().map(|u| u.content.clone()).collect())
            .await?;

        let mut kept: Vec<(KnowledgeUnit, &Vec<f32>)> = Vec::with_capacity(units.len());
        for (unit, vector) in units.into_iter().zip(&vectors) {
            let duplicate = kept.iter().any(|(_, v)| {
                cosine_similarity(v, vector) >= self.config.duplicate_threshold
            });
            if !duplicate {
                kept.push((unit, vector));
            }
        }
        Ok(kept.into_iter().map(|(u, _)| u).collect())
    }

    /// Takes the topic locks of every member in slug order.
    async fn lock_all(&self, members: &[&StoredFile]) -> Vec<TopicGuard> {
        let slugs: BTreeSet<String> = members.iter().map(|m| topic_slug(&m.file.topic)).collect();
        let mut guards = Vec::with_capacity(slugs.len());
        for slug in slugs {
            guards.push(self.store.lock_topic(&slug).await);
        }
        guards
    }
}

fn guard_for<'a>(guards: &'a [TopicGuard], topic: &str) -> Result<&'a TopicGuard, CurioError> {
    let slug = topic_slug(topic);
    guards
        .iter()
        .find(|g| g.slug() == slug)
        .ok_or_else(|| CurioError::Internal(format!("no lock held for `{topic}`")))
}

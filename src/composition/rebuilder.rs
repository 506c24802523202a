//! # Cascade Rebuilder
//!
//! After a publish lands, the layer files above it are stale. The
//! rebuilder regenerates five levels, bottom up:
//!
//! 1. asset layer: latest part per (asset, part) within the artist task
//! 2. artist layer: latest asset layer per asset within the artist
//! 3. department layer: one artist layer per artist in the department
//! 4. shot layer: one department layer per department in the shot
//! 5. sequence layer: one shot layer per shot in the sequence
//!
//! Each level is latest-per-key over the registry followed by one
//! deterministic [`LayerWriter`] write. Filesystem failures at one level
//! never abort the later levels; they are collected and returned as a
//! single aggregated warning so the caller's publish still succeeds.

use std::collections::HashMap;
use std::path::Path;

use crate::composition::writer::LayerWriter;
use crate::error::{PipelineError, Result};
use crate::logging::log_rebuild_operation;
use crate::models::PublishRecord;
use crate::paths::{self, PathContext};
use crate::registry::PublishRegistry;

pub struct CompositionRebuilder {
    registry: PublishRegistry,
    writer: LayerWriter,
}

type Candidate = (PublishRecord, PathContext);

impl CompositionRebuilder {
    pub fn new(registry: PublishRegistry) -> Self {
        Self {
            registry,
            writer: LayerWriter::new(),
        }
    }

    /// Rebuild every layer level affected by `publish`. Returns `None` on
    /// a clean pass, or the aggregated warning text when the publish path
    /// is unparseable or some layer writes failed.
    pub async fn rebuild(&self, publish: &PublishRecord) -> Result<Option<String>> {
        let context = match paths::parse(&publish.asset_path) {
            Some(c) if !c.shared_root.is_empty() && !c.asset_layer_path.is_empty() => c,
            _ => {
                let warning = PipelineError::PathParse(format!(
                    "publish {} path {:?} does not follow the sequences convention; layers not rebuilt",
                    publish.id, publish.asset_path
                ))
                .to_string();
                tracing::warn!(publish_id = publish.id, "{warning}");
                return Ok(Some(warning));
            }
        };

        // Best rank first, so the first record seen per key is the winner.
        let candidates: Vec<Candidate> = self
            .registry
            .composition_candidates()
            .await?
            .into_iter()
            .filter_map(|record| {
                paths::parse(&record.asset_path).map(|context| (record, context))
            })
            .filter(|(_, context)| !context.shared_root.is_empty())
            .collect();

        let mut warnings = Vec::new();
        self.rebuild_asset_level(&context, &candidates, &mut warnings);
        self.rebuild_artist_level(&context, &candidates, &mut warnings);
        self.rebuild_department_level(&context, &candidates, &mut warnings);
        self.rebuild_shot_level(&context, &candidates, &mut warnings);
        self.rebuild_sequence_level(&context, &candidates, &mut warnings);

        if warnings.is_empty() {
            Ok(None)
        } else {
            Ok(Some(warnings.join("; ")))
        }
    }

    fn write_layer(
        &self,
        level: &str,
        target: &str,
        children: Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        match self.writer.write(Path::new(target), &children) {
            Ok(()) => log_rebuild_operation(level, target, children.len(), "written", None),
            Err(e) => {
                log_rebuild_operation(level, target, children.len(), "failed", Some(&e.to_string()));
                warnings.push(format!("{level} layer {target}: {e}"));
            }
        }
    }

    /// Latest publish per part in this (artist, asset) scope, referenced
    /// by stable part path so the asset layer never changes per-iteration.
    fn rebuild_asset_level(
        &self,
        context: &PathContext,
        candidates: &[Candidate],
        warnings: &mut Vec<String>,
    ) {
        let mut seen: HashMap<String, String> = HashMap::new();
        for (record, ctx) in candidates {
            if !ctx.matches_asset(context) || ctx.part.is_empty() {
                continue;
            }
            seen.entry(ctx.part.to_ascii_lowercase())
                .or_insert_with(|| paths::stable_part_path(&record.asset_path, &ctx.part));
        }
        let children: Vec<String> = seen.into_values().collect();
        self.write_layer("asset", &context.asset_layer_path, children, warnings);
    }

    /// One asset layer per asset the artist has published.
    fn rebuild_artist_level(
        &self,
        context: &PathContext,
        candidates: &[Candidate],
        warnings: &mut Vec<String>,
    ) {
        if context.artist.is_empty() {
            warnings.push(format!(
                "path {:?} has no artist segment; artist layer not rebuilt",
                context.asset_layer_path
            ));
            return;
        }
        let mut seen: HashMap<String, String> = HashMap::new();
        for (_, ctx) in candidates {
            if !ctx.matches_artist(context)
                || ctx.asset.is_empty()
                || ctx.asset_layer_path.is_empty()
            {
                continue;
            }
            seen.entry(ctx.asset.to_ascii_lowercase())
                .or_insert_with(|| ctx.asset_layer_path.clone());
        }
        let target = format!("{}/artist/{}.usd", context.shared_root, context.artist);
        self.write_layer("artist", &target, seen.into_values().collect(), warnings);
    }

    /// One artist layer per artist in the department. Artists working
    /// through different tools live under different shared roots, so the
    /// key includes the root.
    fn rebuild_department_level(
        &self,
        context: &PathContext,
        candidates: &[Candidate],
        warnings: &mut Vec<String>,
    ) {
        let mut seen: HashMap<(String, String), String> = HashMap::new();
        for (_, ctx) in candidates {
            if !ctx.matches_department(context) || ctx.artist.is_empty() {
                continue;
            }
            let key = (
                ctx.shared_root.to_ascii_lowercase(),
                ctx.artist.to_ascii_lowercase(),
            );
            seen.entry(key)
                .or_insert_with(|| format!("{}/artist/{}.usd", ctx.shared_root, ctx.artist));
        }
        let target = format!("{}/dept/{}.usd", context.shared_root, context.department);
        self.write_layer("department", &target, seen.into_values().collect(), warnings);
    }

    /// The shot layer references the department layer of every department
    /// that has published into this shot, each through its own shared
    /// root. Written at every root in the shot so the copies agree no
    /// matter which department triggered the rebuild.
    fn rebuild_shot_level(
        &self,
        context: &PathContext,
        candidates: &[Candidate],
        warnings: &mut Vec<String>,
    ) {
        let mut roots: HashMap<String, (String, String)> = HashMap::new();
        for (_, ctx) in candidates {
            if !ctx.matches_shot(context) {
                continue;
            }
            roots
                .entry(ctx.shared_root.to_ascii_lowercase())
                .or_insert_with(|| (ctx.shared_root.clone(), ctx.department.clone()));
        }
        let children: Vec<String> = roots
            .values()
            .map(|(root, dept)| format!("{root}/dept/{dept}.usd"))
            .collect();
        for (root, _) in roots.values() {
            let target = format!("{root}/shot/{}.usd", context.shot);
            self.write_layer("shot", &target, children.clone(), warnings);
        }
    }

    /// The sequence layer references one shot layer per shot. Each shot's
    /// layer is taken from that shot's first shared root in key order,
    /// which the shot-level pass has written.
    fn rebuild_sequence_level(
        &self,
        context: &PathContext,
        candidates: &[Candidate],
        warnings: &mut Vec<String>,
    ) {
        let mut shots: HashMap<String, (String, String)> = HashMap::new();
        let mut roots: HashMap<String, String> = HashMap::new();
        for (_, ctx) in candidates {
            if !ctx.matches_sequence(context) {
                continue;
            }
            let root_key = ctx.shared_root.to_ascii_lowercase();
            roots
                .entry(root_key.clone())
                .or_insert_with(|| ctx.shared_root.clone());
            // Pin each shot to its smallest root key for a stable choice.
            shots
                .entry(ctx.shot.to_ascii_lowercase())
                .and_modify(|(key, _)| {
                    if root_key < *key {
                        *key = root_key.clone();
                    }
                })
                .or_insert_with(|| (root_key.clone(), ctx.shot.clone()));
        }
        let children: Vec<String> = shots
            .values()
            .filter_map(|(root_key, shot)| {
                roots
                    .get(root_key)
                    .map(|root| format!("{root}/shot/{shot}.usd"))
            })
            .collect();
        for root in roots.values() {
            let target = format!("{root}/seq/{}.usd", context.sequence);
            self.write_layer("sequence", &target, children.clone(), warnings);
        }
    }
}

//! # Layer Writer
//!
//! Deterministic serializer for composition layer files. A layer is a
//! plain-text `#usda` header plus an ordered list of sublayer references,
//! each stored relative to the layer's own directory so the tree can be
//! relocated wholesale.
//!
//! Writers targeting the same path are serialized through a lock table,
//! and every write goes to a temporary sibling file first so external
//! consumers never observe a partially written layer.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::paths::normalize_separators;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
pub struct LayerWriter {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LayerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `target` as a layer referencing `children`. Identical child
    /// sets produce byte-identical output regardless of input order.
    pub fn write(&self, target: &Path, children: &[String]) -> Result<()> {
        let key = normalize_key(&target.to_string_lossy());
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let parent = target.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
            PipelineError::filesystem(
                target,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "layer path has no parent"),
            )
        })?;
        fs::create_dir_all(parent).map_err(|e| PipelineError::filesystem(parent, e))?;

        let body = render_layer(parent, children);

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "layer.usd".to_string());
        let temp = parent.join(format!(
            ".{}.tmp.{}.{}",
            file_name,
            process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&temp, body).map_err(|e| PipelineError::filesystem(&temp, e))?;
        fs::rename(&temp, target).map_err(|e| {
            let _ = fs::remove_file(&temp);
            PipelineError::filesystem(target, e)
        })?;

        tracing::debug!(layer = %target.display(), children = children.len(), "layer written");
        Ok(())
    }
}

/// Comparison key for dedup and ordering: separator- and case-normalized.
fn normalize_key(path: &str) -> String {
    normalize_separators(path).to_ascii_lowercase()
}

fn render_layer(parent: &Path, children: &[String]) -> String {
    // Dedup on the normalized key, keeping the first spelling seen after a
    // stable sort, so the output is a pure function of the input set.
    let mut entries: Vec<(String, String)> = children
        .iter()
        .map(|child| (normalize_key(child), normalize_separators(child)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    entries.dedup_by(|a, b| a.0 == b.0);

    let references: Vec<String> = entries
        .iter()
        .map(|(_, child)| relative_reference(parent, child))
        .collect();

    let mut body = String::from("#usda 1.0\n(\n    subLayers = [\n");
    for (index, reference) in references.iter().enumerate() {
        body.push_str("        @");
        body.push_str(reference);
        body.push('@');
        if index + 1 < references.len() {
            body.push(',');
        }
        body.push('\n');
    }
    body.push_str("    ]\n)\n");
    body
}

/// Express `child` relative to `base_dir` using forward slashes. Paths
/// with no common root (different drives, mixed absolute/relative) fall
/// back to the normalized child as given.
fn relative_reference(base_dir: &Path, child: &str) -> String {
    let base = normalize_separators(&base_dir.to_string_lossy());
    let child = normalize_separators(child);

    let base_abs = base.starts_with('/');
    let child_abs = child.starts_with('/');
    if base_abs != child_abs {
        return child;
    }

    let base_parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    let child_parts: Vec<&str> = child.split('/').filter(|s| !s.is_empty()).collect();

    let mut common = 0;
    while common < base_parts.len()
        && common < child_parts.len()
        && base_parts[common].eq_ignore_ascii_case(child_parts[common])
    {
        common += 1;
    }

    // Windows drive prefixes must agree before a relative walk makes sense.
    if common == 0 && !base_parts.is_empty() && base_parts[0].ends_with(':') {
        return child;
    }

    let mut pieces: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        pieces.push("..".to_string());
    }
    for part in &child_parts[common..] {
        pieces.push((*part).to_string());
    }

    if pieces.is_empty() {
        ".".to_string()
    } else if pieces[0] == ".." {
        pieces.join("/")
    } else {
        format!("./{}", pieces.join("/"))
    }
}

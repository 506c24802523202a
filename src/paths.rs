//! # Path Context Parsing
//!
//! Recovers hierarchy coordinates from the conventional task workspace
//! layout:
//!
//! ```text
//! <root>/<show>/sequences/<seq>/<shot>/<dept>/<tool>/scenes/<artist>/<task>/usd/<asset>/<part>/<part>.usd
//! ```
//!
//! The `sequences` anchor and the three segments after it are mandatory;
//! everything deeper is optional and missing pieces stay empty rather
//! than failing the parse.

use serde::Serialize;
use serde_json::Value;

/// Hierarchy coordinates recovered from a stable path. Absent fields are
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathContext {
    pub sequence: String,
    pub shot: String,
    pub department: String,
    pub artist: String,
    pub task: String,
    pub asset: String,
    pub part: String,
    /// Root shared by every derived layer in this department tree.
    pub shared_root: String,
    /// Where the asset-level layer for this context is written.
    pub asset_layer_path: String,
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl PathContext {
    /// Same (sequence) coordinates.
    pub fn matches_sequence(&self, other: &Self) -> bool {
        eq_fold(&self.sequence, &other.sequence)
    }

    /// Same (sequence, shot) coordinates.
    pub fn matches_shot(&self, other: &Self) -> bool {
        self.matches_sequence(other) && eq_fold(&self.shot, &other.shot)
    }

    /// Same (sequence, shot, department) coordinates.
    pub fn matches_department(&self, other: &Self) -> bool {
        self.matches_shot(other) && eq_fold(&self.department, &other.department)
    }

    /// Same (sequence, shot, department, artist) coordinates.
    pub fn matches_artist(&self, other: &Self) -> bool {
        self.matches_department(other) && eq_fold(&self.artist, &other.artist)
    }

    /// Same (sequence, shot, department, artist, asset) coordinates.
    pub fn matches_asset(&self, other: &Self) -> bool {
        self.matches_artist(other) && eq_fold(&self.asset, &other.asset)
    }
}

pub fn normalize_separators(path: &str) -> String {
    path.trim().replace('\\', "/")
}

fn join_segments(leading_slash: bool, segments: &[&str]) -> String {
    let joined = segments.join("/");
    if leading_slash {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Parse a conventional path into hierarchy coordinates. Returns `None`
/// when the `sequences` anchor or the three segments after it are
/// missing; callers treat that as a non-fatal condition.
pub fn parse(path: &str) -> Option<PathContext> {
    let normalized = normalize_separators(path);
    if normalized.is_empty() {
        return None;
    }
    let leading_slash = normalized.starts_with('/');
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

    let anchor = segments.iter().position(|s| *s == "sequences")?;
    if segments.len() <= anchor + 3 {
        return None;
    }

    let mut context = PathContext {
        sequence: segments[anchor + 1].to_string(),
        shot: segments[anchor + 2].to_string(),
        department: segments[anchor + 3].to_string(),
        ..PathContext::default()
    };

    // Optional <tool>/scenes/<artist>/<task> sub-chain below the department.
    if let Some(scenes_idx) = segments[anchor + 4..]
        .iter()
        .position(|s| *s == "scenes")
        .map(|i| i + anchor + 4)
    {
        if let Some(artist) = segments.get(scenes_idx + 1) {
            context.artist = (*artist).to_string();
        }
        if let Some(task) = segments.get(scenes_idx + 2) {
            context.task = (*task).to_string();
        }
    }

    // Optional usd/<asset>/<part> tail below the department.
    if let Some(usd_idx) = segments[anchor + 4..]
        .iter()
        .position(|s| *s == "usd")
        .map(|i| i + anchor + 4)
    {
        if let Some(asset) = segments.get(usd_idx + 1) {
            context.asset = (*asset).to_string();
            context.asset_layer_path = format!(
                "{}/{}.usd",
                join_segments(leading_slash, &segments[..=usd_idx + 1]),
                asset
            );
        }
        if let Some(part) = segments.get(usd_idx + 2) {
            context.part = (*part).to_string();
        }
    }

    // Shared layer root: the department tool directory plus "usd".
    if segments.len() > anchor + 4 {
        context.shared_root = format!(
            "{}/usd",
            join_segments(leading_slash, &segments[..=anchor + 4])
        );
    }

    Some(context)
}

const UNKNOWN_ASSET: &str = "unknown_asset";
const UNKNOWN_PART: &str = "unknown_part";

/// Derive (asset, part) names for a publish when no parseable context is
/// required: explicit metadata hints win, then the nearest `usd` anchor in
/// the path, then the file stem. Deterministic and idempotent, since the
/// result feeds the stable path used for deduplication.
pub fn derive_asset_part(metadata: &Value, asset_path: &str, item_path: &str) -> (String, String) {
    let hint = |keys: &[&str]| -> String {
        for key in keys {
            if let Some(value) = metadata.get(key).and_then(Value::as_str) {
                let value = value.trim();
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
        String::new()
    };

    let mut asset_name = hint(&["asset", "asset_name"]);
    let mut part_name = hint(&["fx_layer", "part_name"]);

    if !asset_name.is_empty() && !part_name.is_empty() {
        return (asset_name, part_name);
    }

    let raw = if asset_path.trim().is_empty() {
        item_path
    } else {
        asset_path
    };
    let normalized = normalize_separators(raw);
    if normalized.is_empty() {
        return (
            non_empty_or(asset_name, UNKNOWN_ASSET),
            non_empty_or(part_name, UNKNOWN_PART),
        );
    }

    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(usd_idx) = segments.iter().position(|s| *s == "usd") {
        if asset_name.is_empty() {
            if let Some(asset) = segments.get(usd_idx + 1) {
                asset_name = (*asset).to_string();
            }
        }
        if part_name.is_empty() {
            if let Some(part) = segments.get(usd_idx + 2) {
                part_name = (*part).to_string();
            }
        }
    }

    if part_name.is_empty() {
        part_name = segments
            .len()
            .checked_sub(2)
            .and_then(|i| segments.get(i))
            .map(|s| (*s).to_string())
            .unwrap_or_default();
    }
    if asset_name.is_empty() {
        let stem = segments
            .last()
            .map(|s| s.split('.').next().unwrap_or(""))
            .unwrap_or("");
        asset_name = stem.split('_').next().unwrap_or("").to_string();
    }

    (
        non_empty_or(asset_name, UNKNOWN_ASSET),
        non_empty_or(part_name, UNKNOWN_PART),
    )
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Stable layer path for a part: `{part_dir}/{part}.usd`, a pure function
/// of the part's directory and name, independent of version/iteration.
pub fn stable_part_path(recorded_path: &str, part: &str) -> String {
    let normalized = normalize_separators(recorded_path);
    match normalized.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{part}.usd"),
        None => format!("{part}.usd"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FULL_PATH: &str =
        "/show/TestShow/sequences/010/0020/fx/houdini/scenes/jdoe/fx_task/usd/barrel/sparks/sparks.usd";

    #[test]
    fn test_parse_round_trip() {
        let context = parse(FULL_PATH).unwrap();
        assert_eq!(context.sequence, "010");
        assert_eq!(context.shot, "0020");
        assert_eq!(context.department, "fx");
        assert_eq!(context.artist, "jdoe");
        assert_eq!(context.task, "fx_task");
        assert_eq!(context.asset, "barrel");
        assert_eq!(context.part, "sparks");
        assert_eq!(
            context.shared_root,
            "/show/TestShow/sequences/010/0020/fx/houdini/usd"
        );
        assert_eq!(
            context.asset_layer_path,
            "/show/TestShow/sequences/010/0020/fx/houdini/scenes/jdoe/fx_task/usd/barrel/barrel.usd"
        );
    }

    #[test]
    fn test_parse_backslashes() {
        let windows = FULL_PATH.replace('/', "\\");
        // A windows path has no leading slash once normalized; coordinates
        // still parse identically.
        let context = parse(&windows).unwrap();
        assert_eq!(context.sequence, "010");
        assert_eq!(context.asset, "barrel");
    }

    #[test]
    fn test_parse_without_anchor_is_none() {
        assert!(parse("/show/TestShow/shots/010/0020/fx").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_parse_truncated_after_anchor_is_none() {
        assert!(parse("/show/TestShow/sequences/010/0020").is_none());
    }

    #[test]
    fn test_parse_without_subchains_leaves_fields_empty() {
        let context = parse("/show/TestShow/sequences/010/0020/fx/houdini/cache.bgeo").unwrap();
        assert_eq!(context.department, "fx");
        assert_eq!(context.artist, "");
        assert_eq!(context.task, "");
        assert_eq!(context.asset, "");
        assert_eq!(
            context.shared_root,
            "/show/TestShow/sequences/010/0020/fx/houdini/usd"
        );
        assert_eq!(context.asset_layer_path, "");
    }

    #[test]
    fn test_derive_prefers_metadata_hints() {
        let metadata = json!({"asset": "barrel", "fx_layer": "sparks"});
        let (asset, part) = derive_asset_part(&metadata, "/somewhere/else.usd", "");
        assert_eq!(asset, "barrel");
        assert_eq!(part, "sparks");
    }

    #[test]
    fn test_derive_from_usd_anchor() {
        let (asset, part) = derive_asset_part(&json!({}), FULL_PATH, "");
        assert_eq!(asset, "barrel");
        assert_eq!(part, "sparks");
    }

    #[test]
    fn test_derive_fallback_to_stem() {
        let (asset, part) = derive_asset_part(&json!({}), "/caches/barrel_sparks_v001.usd", "");
        assert_eq!(asset, "barrel");
        assert_eq!(part, "caches");
    }

    #[test]
    fn test_derive_placeholders_when_nothing_available() {
        let (asset, part) = derive_asset_part(&json!({}), "", "");
        assert_eq!(asset, "unknown_asset");
        assert_eq!(part, "unknown_part");
    }

    #[test]
    fn test_derive_is_idempotent() {
        let metadata = json!({"part_name": "smoke"});
        let first = derive_asset_part(&metadata, FULL_PATH, "");
        let second = derive_asset_part(&metadata, FULL_PATH, "");
        assert_eq!(first, second);
    }

    #[test]
    fn test_stable_part_path() {
        assert_eq!(
            stable_part_path("/a/b/sparks/sparks_v001_i002.usd", "sparks"),
            "/a/b/sparks/sparks.usd"
        );
        assert_eq!(stable_part_path("loose.usd", "loose"), "loose.usd");
    }
}

mod common;

use std::path::{Path, PathBuf};

use pipeline_core::api::PublishApi;
use pipeline_core::registry::{CreatePublishRequest, PublishRegistry};
use pipeline_core::versioning::Bump;
use tempfile::TempDir;

fn api(db: &common::TestDb) -> PublishApi {
    let registry = PublishRegistry::new(db.pool.clone(), &db.config);
    PublishApi::new(registry, &db.config)
}

fn publish_for(
    task_id: i64,
    root: &Path,
    dept: &str,
    tool: &str,
    artist: &str,
    asset: &str,
    part: &str,
) -> CreatePublishRequest {
    let part_dir = root.join(format!(
        "TestShow/sequences/010/0020/{dept}/{tool}/scenes/{artist}/fx_task/usd/{asset}/{part}"
    ));
    CreatePublishRequest {
        task_id: Some(task_id),
        target_kind: None,
        target_id: None,
        software: tool.to_string(),
        source_version: None,
        source_iteration: None,
        bump: Bump::Iteration,
        item_path: Some(part_dir.join(format!("{part}_v001.usd")).display().to_string()),
        asset_path: Some(part_dir.join(format!("{part}.usd")).display().to_string()),
        preview_path: None,
        status: None,
        label: None,
        comment: None,
        metadata: None,
        components: Vec::new(),
        links: Vec::new(),
    }
}

fn shared_root(root: &Path, dept: &str, tool: &str) -> PathBuf {
    root.join(format!("TestShow/sequences/010/0020/{dept}/{tool}/usd"))
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("missing layer {}: {e}", path.display()))
}

#[tokio::test]
async fn publishing_rebuilds_the_full_cascade() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api(&db);
    let root = TempDir::new().unwrap();

    let sparks = api
        .create_publish(
            None,
            &publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "sparks"),
        )
        .await
        .unwrap();
    assert!(sparks.rebuild_warning.is_none());
    assert_eq!(sparks.part_name, "sparks");
    assert!(sparks.part_usd_path.ends_with("/sparks/sparks.usd"));

    api.create_publish(
        None,
        &publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "smoke"),
    )
    .await
    .unwrap();

    let task_usd = root
        .path()
        .join("TestShow/sequences/010/0020/fx/houdini/scenes/jdoe/fx_task/usd");
    let fx_shared = shared_root(root.path(), "fx", "houdini");

    let asset_layer = read(&task_usd.join("barrel/barrel.usd"));
    assert!(asset_layer.starts_with("#usda 1.0"));
    assert!(asset_layer.contains("@./sparks/sparks.usd@"));
    assert!(asset_layer.contains("@./smoke/smoke.usd@"));

    let artist_layer = read(&fx_shared.join("artist/jdoe.usd"));
    assert!(artist_layer.contains("barrel/barrel.usd@"));

    let dept_layer = read(&fx_shared.join("dept/fx.usd"));
    assert!(dept_layer.contains("@../artist/jdoe.usd@"));

    let shot_layer = read(&fx_shared.join("shot/0020.usd"));
    assert!(shot_layer.contains("@../dept/fx.usd@"));

    let seq_layer = read(&fx_shared.join("seq/010.usd"));
    assert!(seq_layer.contains("@../shot/0020.usd@"));
}

#[tokio::test]
async fn asset_layer_is_stable_across_iterations() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api(&db);
    let root = TempDir::new().unwrap();

    let request =
        publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "sparks");
    api.create_publish(None, &request).await.unwrap();

    let asset_layer_path = root
        .path()
        .join("TestShow/sequences/010/0020/fx/houdini/scenes/jdoe/fx_task/usd/barrel/barrel.usd");
    let first = read(&asset_layer_path);

    // A new iteration of the same part rewrites byte-identical layers.
    let mut again = request.clone();
    again.item_path = again.item_path.map(|p| p.replace("_v001", "_v002"));
    api.create_publish(None, &again).await.unwrap();
    let second = read(&asset_layer_path);

    assert_eq!(first, second);
    assert_eq!(second.matches("sparks.usd").count(), 1);
}

#[tokio::test]
async fn shot_layer_aggregates_every_department() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api(&db);
    let root = TempDir::new().unwrap();

    api.create_publish(
        None,
        &publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "sparks"),
    )
    .await
    .unwrap();
    api.create_publish(
        None,
        &publish_for(ids.task_id, root.path(), "anim", "maya", "asmith", "hero", "body"),
    )
    .await
    .unwrap();

    // Both roots carry a shot layer, and each references both departments.
    for (dept, tool) in [("fx", "houdini"), ("anim", "maya")] {
        let shot_layer = read(&shared_root(root.path(), dept, tool).join("shot/0020.usd"));
        assert!(shot_layer.contains("dept/fx.usd@"), "{dept} shot layer misses fx");
        assert!(shot_layer.contains("dept/anim.usd@"), "{dept} shot layer misses anim");
    }

    // The sequence layer references the shot exactly once.
    let seq_layer = read(&shared_root(root.path(), "anim", "maya").join("seq/010.usd"));
    assert_eq!(seq_layer.matches("0020.usd@").count(), 1);
}

#[tokio::test]
async fn blocked_level_warns_without_aborting_the_rest() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api(&db);
    let root = TempDir::new().unwrap();

    // A plain file squatting where the artist layer directory must go.
    let fx_shared = shared_root(root.path(), "fx", "houdini");
    std::fs::create_dir_all(&fx_shared).unwrap();
    std::fs::write(fx_shared.join("artist"), b"").unwrap();

    let response = api
        .create_publish(
            None,
            &publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "sparks"),
        )
        .await
        .unwrap();

    let warning = response.rebuild_warning.expect("expected a rebuild warning");
    assert!(warning.contains("artist layer"), "{warning}");

    // Every other level still landed.
    let task_usd = root
        .path()
        .join("TestShow/sequences/010/0020/fx/houdini/scenes/jdoe/fx_task/usd");
    assert!(task_usd.join("barrel/barrel.usd").exists());
    assert!(fx_shared.join("dept/fx.usd").exists());
    assert!(fx_shared.join("shot/0020.usd").exists());
    assert!(fx_shared.join("seq/010.usd").exists());
    assert!(!fx_shared.join("artist").is_dir());
}

#[tokio::test]
async fn unconventional_path_warns_and_writes_nothing() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api(&db);
    let root = TempDir::new().unwrap();

    let mut request =
        publish_for(ids.task_id, root.path(), "fx", "houdini", "jdoe", "barrel", "sparks");
    let flat = root.path().join("flat/sparks.usd");
    request.item_path = Some(flat.display().to_string());
    request.asset_path = Some(flat.display().to_string());

    let response = api.create_publish(None, &request).await.unwrap();
    assert!(response.rebuild_warning.is_some());
    // The record is durable even though no layers were written.
    assert_eq!(
        (response.publish.source_version, response.publish.source_iteration),
        (1, 1)
    );
    assert!(std::fs::read_dir(root.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| e.file_name() != "TestShow"));
}

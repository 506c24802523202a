mod common;

use pipeline_core::api::{ListPublishesRequest, PublishApi, RecordSceneRequest};
use pipeline_core::api::PublishListing;
use pipeline_core::registry::{CreatePublishRequest, PublishFilters, PublishRegistry};
use pipeline_core::versioning::{Bump, StreamScope};
use pipeline_core::{PipelineError, TargetKind, TargetRef};

fn api_with_token(db: &common::TestDb, token: Option<&str>) -> PublishApi {
    let mut config = db.config.clone();
    config.api_token = token.map(str::to_string);
    let registry = PublishRegistry::new(db.pool.clone(), &config);
    PublishApi::new(registry, &config)
}

fn create_request(task_id: i64) -> CreatePublishRequest {
    CreatePublishRequest {
        task_id: Some(task_id),
        target_kind: None,
        target_id: None,
        software: "houdini".to_string(),
        source_version: None,
        source_iteration: None,
        bump: Bump::default(),
        item_path: None,
        asset_path: None,
        preview_path: None,
        status: None,
        label: None,
        comment: None,
        metadata: None,
        components: Vec::new(),
        links: Vec::new(),
    }
}

#[tokio::test]
async fn mutations_require_the_configured_token() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api_with_token(&db, Some("sekrit"));

    let denied = api.create_publish(None, &create_request(ids.task_id)).await;
    assert!(matches!(denied, Err(PipelineError::Unauthorized(_))));

    let wrong = api
        .create_publish(Some("guess"), &create_request(ids.task_id))
        .await;
    assert!(matches!(wrong, Err(PipelineError::Unauthorized(_))));

    let accepted = api
        .create_publish(Some("sekrit"), &create_request(ids.task_id))
        .await;
    assert!(accepted.is_ok());

    let scene_denied = api
        .scenes_record(
            None,
            &RecordSceneRequest {
                task_id: ids.task_id,
                artist_id: None,
                software: "houdini".to_string(),
                file_path: "/scenes/a.hip".to_string(),
                version: 1,
                iteration: 1,
            },
        )
        .await;
    assert!(matches!(scene_denied, Err(PipelineError::Unauthorized(_))));

    // Reads stay open.
    assert!(api.scenes(ids.task_id, "houdini").await.is_ok());
}

#[tokio::test]
async fn without_a_token_every_caller_may_write() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api_with_token(&db, None);

    let response = api
        .create_publish(None, &create_request(ids.task_id))
        .await
        .unwrap();
    assert_eq!(response.version_label, "v001");
    assert_eq!(response.iteration_label, "i001");
    assert!(response.links.is_empty());
    // No stable path without an asset path.
    assert!(response.part_usd_path.is_empty());
}

#[tokio::test]
async fn listing_shape_follows_the_request_flags() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api_with_token(&db, None);

    api.create_publish(None, &create_request(ids.task_id))
        .await
        .unwrap();

    let records = api
        .list_publishes(&ListPublishesRequest::default())
        .await
        .unwrap();
    assert!(matches!(records, PublishListing::Records(ref rows) if rows.len() == 1));

    let detailed = api
        .list_publishes(&ListPublishesRequest {
            include_components: true,
            ..ListPublishesRequest::default()
        })
        .await
        .unwrap();
    assert!(matches!(detailed, PublishListing::Detailed(ref rows) if rows.len() == 1));

    let per_part = api
        .list_publishes(&ListPublishesRequest {
            latest_per_part: true,
            ..ListPublishesRequest::default()
        })
        .await
        .unwrap();
    // No asset paths were recorded, so the aggregation is empty.
    assert!(matches!(per_part, PublishListing::LatestPerPart(ref rows) if rows.is_empty()));

    let filtered = api
        .list_publishes(&ListPublishesRequest {
            filters: PublishFilters {
                software: Some("maya".to_string()),
                ..PublishFilters::default()
            },
            ..ListPublishesRequest::default()
        })
        .await
        .unwrap();
    assert!(matches!(filtered, PublishListing::Records(ref rows) if rows.is_empty()));
}

#[tokio::test]
async fn next_numbers_previews_the_publish_stream() {
    let db = common::test_db().await;
    let ids = common::seed_entities(&db.pool).await;
    let api = api_with_token(&db, None);

    api.create_publish(None, &create_request(ids.task_id))
        .await
        .unwrap();

    let scope = StreamScope::Publish {
        target: TargetRef::new(TargetKind::Project, ids.project_id),
        task_id: Some(ids.task_id),
        software: Some("houdini".to_string()),
    };
    let preview = api.next_numbers(&scope, Bump::Iteration).await.unwrap();
    assert_eq!((preview.version, preview.iteration), (1, 2));

    let bumped = api.next_numbers(&scope, Bump::Version).await.unwrap();
    assert_eq!((bumped.version, bumped.iteration), (2, 1));
    assert_eq!(bumped.version_label, "v002");
}

//! マージパッチ・ドキュメントAPIの統合テスト

mod support;

use inspection_common::{
    ComponentPatch, ComponentUpsert, Condition, ImageRef, InspectionDocument, PatchSummary, ReportPatch,
    RoomBlock,
};
use inspection_sync::document::{DocumentApi, JsonDocumentStore};
use inspection_sync::error::{ErrorCategory, InspectionError};
use serde_json::json;
use std::sync::Arc;
use support::{component, kitchen_document, MemoryDocumentStore};
use tempfile::tempdir;

fn api_with(doc: InspectionDocument) -> (Arc<MemoryDocumentStore>, DocumentApi) {
    let store = MemoryDocumentStore::with_document("r1", doc);
    let api = DocumentApi::new(store.clone());
    (store, api)
}

fn image(id: &str) -> ImageRef {
    ImageRef {
        id: id.to_string(),
        url: format!("https://storage.test/{}", id),
    }
}

#[tokio::test]
async fn test_update_component_preserves_identity_and_siblings() {
    let (store, api) = api_with(kitchen_document());
    let before = store.document("r1");

    let patch = ComponentPatch {
        name: Some("Renamed".to_string()),
        component_type: Some("other".to_string()),
        description: Some("Chipped enamel".to_string()),
        condition: Some(Condition::Fair),
        ..Default::default()
    };
    api.update_component("r1", "kitchen", "c2", &patch).await.unwrap();

    let after = store.document("r1");
    let c2 = after.find_component("c2").unwrap();
    assert_eq!(c2.name, "Component 2");
    assert_eq!(c2.component_type, "fixture");
    assert_eq!(c2.description, "Chipped enamel");
    assert_eq!(c2.condition, Some(Condition::Fair));

    for id in ["c1", "c3", "c4", "c5"] {
        assert_eq!(after.find_component(id), before.find_component(id));
    }
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_omitted_fields_keep_existing_values() {
    let mut doc = kitchen_document();
    doc.components[0].notes = "keep me".to_string();
    doc.components[0].images = vec![image("i1")];
    let (store, api) = api_with(doc);

    let patch = ComponentPatch {
        cleanliness: Some("dusty".to_string()),
        ..Default::default()
    };
    api.update_component("r1", "kitchen", "c1", &patch).await.unwrap();

    let c1 = store.document("r1").components[0].clone();
    assert_eq!(c1.notes, "keep me");
    assert_eq!(c1.images, vec![image("i1")]);
    assert_eq!(c1.cleanliness, "dusty");
}

#[tokio::test]
async fn test_update_component_in_additional_room() {
    let mut doc = kitchen_document();
    doc.additional_rooms.push(RoomBlock {
        id: "bath".to_string(),
        name: "Bathroom".to_string(),
        room_type: "bathroom".to_string(),
        components: vec![component("b1", "Vanity")],
    });
    let (store, api) = api_with(doc);

    let patch = ComponentPatch {
        add_images: vec![image("i1")],
        ..Default::default()
    };
    api.update_component("r1", "bath", "b1", &patch).await.unwrap();

    let doc = store.document("r1");
    assert_eq!(doc.additional_rooms[0].components[0].images, vec![image("i1")]);
    assert!(doc.components.iter().all(|c| c.images.is_empty()));
}

#[tokio::test]
async fn test_repeated_patch_is_idempotent() {
    let (store, api) = api_with(kitchen_document());
    let patch = ComponentPatch {
        description: Some("Same".to_string()),
        add_images: vec![image("i1"), image("i2")],
        ..Default::default()
    };

    api.update_component("r1", "kitchen", "c1", &patch).await.unwrap();
    let once = store.document("r1");
    api.update_component("r1", "kitchen", "c1", &patch).await.unwrap();
    let twice = store.document("r1");

    assert_eq!(once, twice);
    assert_eq!(twice.components[0].images.len(), 2);
}

#[tokio::test]
async fn test_unresolvable_targets_fail_without_write() {
    let (store, api) = api_with(kitchen_document());
    let patch = ComponentPatch {
        description: Some("x".to_string()),
        ..Default::default()
    };

    let err = api.update_component("r1", "attic", "c1", &patch).await.unwrap_err();
    assert!(matches!(err, InspectionError::NotFound { kind: "room", .. }));
    assert_eq!(err.category(), ErrorCategory::NotFound);

    let err = api.update_component("r1", "kitchen", "c9", &patch).await.unwrap_err();
    assert!(matches!(err, InspectionError::NotFound { kind: "component", .. }));

    let err = api.update_component("missing", "kitchen", "c1", &patch).await.unwrap_err();
    assert!(matches!(err, InspectionError::NotFound { kind: "report", .. }));

    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_validation_before_any_io() {
    let (store, api) = api_with(kitchen_document());

    let err = api
        .update_component("r1", "kitchen", "c1", &ComponentPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let err = api
        .update_component("", "kitchen", "c1", &ComponentPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let err = api
        .update_report_batch("r1", &ReportPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let mut data = serde_json::Map::new();
    data.insert("components".to_string(), json!([]));
    let reserved = ReportPatch {
        additional_data: Some(data),
        ..Default::default()
    };
    let err = api.update_report_batch("r1", &reserved).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_report_batch_merges_and_appends() {
    let (store, api) = api_with(kitchen_document());

    let mut data = serde_json::Map::new();
    data.insert("sections".to_string(), json!({"exterior": {"done": true}}));
    data.insert("inspector".to_string(), json!("Sam"));
    let patch = ReportPatch {
        general_condition: Some("Well kept".to_string()),
        components: Some(vec![
            ComponentUpsert {
                id: "c1".to_string(),
                patch: ComponentPatch {
                    description: Some("Updated".to_string()),
                    ..Default::default()
                },
            },
            ComponentUpsert {
                id: "custom-1".to_string(),
                patch: ComponentPatch {
                    name: Some("Wine Fridge".to_string()),
                    is_custom: Some(true),
                    ..Default::default()
                },
            },
        ]),
        additional_data: Some(data),
    };

    let summary = api.update_report_batch("r1", &patch).await.unwrap();
    assert_eq!(summary, PatchSummary { merged: 1, appended: 1 });

    let doc = store.document("r1");
    assert_eq!(doc.general_condition, "Well kept");
    assert_eq!(doc.components.len(), 6);
    assert_eq!(doc.find_component("c1").unwrap().description, "Updated");
    assert_eq!(doc.find_component("c1").unwrap().name, "Component 1");
    let custom = doc.find_component("custom-1").unwrap();
    assert_eq!(custom.name, "Wine Fridge");
    assert!(custom.is_custom);
    assert_eq!(doc.sections["exterior"]["done"], json!(true));
    assert_eq!(doc.extra["inspector"], json!("Sam"));
    assert_eq!(store.write_count(), 1);

    // 同じパッチの再適用で件数は増えない
    let again = api.update_report_batch("r1", &patch).await.unwrap();
    assert_eq!(again, PatchSummary { merged: 2, appended: 0 });
    assert_eq!(store.document("r1").components.len(), 6);
}

#[tokio::test]
async fn test_save_room_components_rejects_duplicates() {
    let (store, api) = api_with(kitchen_document());

    let err = api
        .save_room_components("r1", "kitchen", &[component("a", "A"), component("a", "B")])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_json_store_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let api = DocumentApi::new(Arc::new(JsonDocumentStore::new(dir.path())));

    api.create_document("r1", &kitchen_document(), false).await.unwrap();
    let err = api
        .create_document("r1", &kitchen_document(), false)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let patch = ComponentPatch {
        condition: Some(Condition::NeedsReplacement),
        ..Default::default()
    };
    api.update_component("r1", "kitchen", "c4", &patch).await.unwrap();

    let doc = api.get_document("r1").await.unwrap();
    assert_eq!(doc.find_component("c4").unwrap().condition, Some(Condition::NeedsReplacement));
    assert_eq!(doc.component_count(), 5);

    api.create_document("r1", &InspectionDocument::new("kitchen"), true)
        .await
        .unwrap();
    assert_eq!(api.get_document("r1").await.unwrap().component_count(), 0);
}

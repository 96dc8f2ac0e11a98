use rustodm::{
    DocumentMetadata, FieldType, Mapper, MemoryStore, OdmError, Record, Store, Value, ID_FIELD,
};
use std::sync::Arc;

fn build_mapper(store: Arc<MemoryStore>) -> Arc<Mapper> {
    Mapper::builder(store)
        .register(
            DocumentMetadata::new("article", "articles")
                .field("title", FieldType::Text)
                .field("score", FieldType::Integer)
                .embedded_one("source", "source")
                .embedded_many("comments", "comment"),
        )
        .register(
            DocumentMetadata::embedded("source")
                .field("name", FieldType::Text)
                .embedded_one("info", "info"),
        )
        .register(DocumentMetadata::embedded("info").field("note", FieldType::Text))
        .register(
            DocumentMetadata::embedded("comment")
                .field("body", FieldType::Text)
                .field("author", FieldType::Text),
        )
        .build()
}

fn article_record(id: i64, title: &str, score: i64) -> Record {
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::Integer(id));
    record.insert("title".to_string(), Value::from(title));
    record.insert("score".to_string(), Value::Integer(score));
    record
}

#[tokio::test]
async fn test_set_records_first_original() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    article
        .set_document_data(&article_record(1, "first", 1), true, None)
        .unwrap();

    article.set("title", "second").unwrap();
    article.set("title", "third").unwrap();

    assert!(article.is_field_modified("title"));
    assert_eq!(article.original_field_value("title"), Value::from("first"));
}

#[tokio::test]
async fn test_clear_modified_resets_original_lookup() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    article
        .set_document_data(&article_record(1, "first", 1), true, None)
        .unwrap();

    article.set("title", "second").unwrap();
    article.clear_modified();

    assert!(!article.is_field_modified("title"));
    // after clearing, the original lookup falls back to the current value
    assert_eq!(article.original_field_value("title"), Value::from("second"));
}

#[tokio::test]
async fn test_recorded_null_original_counts_as_modified() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();

    article.set("title", "anything").unwrap();

    assert!(article.is_field_modified("title"));
    assert_eq!(article.original_field_value("title"), Value::Null);
}

#[tokio::test]
async fn test_set_back_to_original_unmarks() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    article
        .set_document_data(&article_record(1, "first", 1), true, None)
        .unwrap();

    article.set("title", "second").unwrap();
    article.set("title", "first").unwrap();

    assert!(!article.is_field_modified("title"));
    assert!(!article.is_modified());
}

#[tokio::test]
async fn test_unknown_field_is_rejected() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();

    assert!(matches!(
        article.set("nope", 1),
        Err(OdmError::UnknownField(_, _))
    ));
    assert!(matches!(
        article.get("nope"),
        Err(OdmError::UnknownField(_, _))
    ));
}

#[tokio::test]
async fn test_query_fields_sentinel() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();

    // nothing known about the loading projection
    assert!(!article.is_field_in_query("title"));

    article.set_query_fields(Some(vec!["title".to_string()]));
    assert!(article.is_field_in_query("title"));
    assert!(!article.is_field_in_query("score"));

    // empty set means "all fields present"
    article.set_query_fields(None);
    assert!(article.is_field_in_query("score"));
}

#[tokio::test]
async fn test_load_full_keeps_local_edits() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "stored", 7)])
        .await
        .unwrap();

    let article = mapper.create("article").unwrap();
    let mut partial = Record::new();
    partial.insert(ID_FIELD.to_string(), Value::Integer(1));
    partial.insert("title".to_string(), Value::from("stored"));
    article
        .set_document_data(&partial, true, Some(vec!["title".to_string()]))
        .unwrap();

    article.set("title", "local edit").unwrap();
    article.load_full().await.unwrap();

    assert_eq!(article.get("title").unwrap(), Value::from("local edit"));
    assert_eq!(article.get("score").unwrap(), Value::Integer(7));
    assert!(article.is_field_in_query("score"));
}

#[tokio::test]
async fn test_get_or_load_fetches_missing_fields() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "stored", 7)])
        .await
        .unwrap();

    let article = mapper.create("article").unwrap();
    let mut partial = Record::new();
    partial.insert(ID_FIELD.to_string(), Value::Integer(1));
    partial.insert("title".to_string(), Value::from("stored"));
    article
        .set_document_data(&partial, true, Some(vec!["title".to_string()]))
        .unwrap();

    // the plain getter only sees what was loaded
    assert_eq!(article.get("score").unwrap(), Value::Null);
    // the loading getter fills the gap from the store
    assert_eq!(article.get_or_load("score").await.unwrap(), Value::Integer(7));
    assert!(article.is_field_in_query("score"));
}

#[tokio::test]
async fn test_refresh_replaces_state_and_requires_persisted() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "stored", 7)])
        .await
        .unwrap();

    let article = mapper.create("article").unwrap();
    article
        .set_document_data(&article_record(1, "stored", 7), true, None)
        .unwrap();
    article.set("title", "local edit").unwrap();

    article.refresh().await.unwrap();
    assert_eq!(article.get("title").unwrap(), Value::from("stored"));
    assert!(!article.is_modified());

    let fresh = mapper.create("article").unwrap();
    assert!(matches!(
        fresh.refresh().await,
        Err(OdmError::DocumentIsNew(_))
    ));
}

#[tokio::test]
async fn test_embedded_one_marker_counts_only_on_persisted_roots() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));

    // clean embedded value
    let source = mapper.create_embedded("source").unwrap();
    source.set("name", "feed").unwrap();
    source.clear_modified();

    // new root: slot replacement alone is implied by the upcoming insert
    let fresh = mapper.create("article").unwrap();
    fresh.set_embedded_one("source", Some(source.clone())).unwrap();
    assert!(fresh.is_embedded_one_changed("source"));
    assert!(!fresh.is_modified());

    // persisted root: the same replacement is a modification
    let persisted = mapper.create("article").unwrap();
    persisted
        .set_document_data(&article_record(1, "stored", 7), true, None)
        .unwrap();
    let other = mapper.create_embedded("source").unwrap();
    other.set("name", "feed2").unwrap();
    other.clear_modified();
    persisted.set_embedded_one("source", Some(other)).unwrap();
    assert!(persisted.is_modified());
}

#[tokio::test]
async fn test_embedded_modification_propagates_to_root() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    article
        .set_document_data(&article_record(1, "stored", 7), true, None)
        .unwrap();

    let source = mapper.create_embedded("source").unwrap();
    source.set("name", "feed").unwrap();
    source.clear_modified();
    article.set_embedded_one("source", Some(source.clone())).unwrap();
    article.clear_modified();
    assert!(!article.is_modified());

    source.set("name", "renamed").unwrap();
    assert!(article.is_modified());
}

#[tokio::test]
async fn test_root_and_path_cascade() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    let source = mapper.create_embedded("source").unwrap();
    let info = mapper.create_embedded("info").unwrap();

    // attach the child before the parent has a root; the cascade stamps both
    source.set_embedded_one("info", Some(info.clone())).unwrap();
    article.set_embedded_one("source", Some(source.clone())).unwrap();

    assert_eq!(source.path().as_deref(), Some("source"));
    assert_eq!(info.path().as_deref(), Some("source.info"));
    assert!(source.root().unwrap().same_instance(&article));
}

#[tokio::test]
async fn test_embedded_projection_delegates_to_root() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();
    article.set_query_fields(Some(vec!["title".to_string()]));

    let source = mapper.create_embedded("source").unwrap();
    article.set_embedded_one("source", Some(source.clone())).unwrap();

    assert!(!source.is_field_in_query("name"));
    article.set_query_fields(None);
    assert!(source.is_field_in_query("name"));

    let detached = mapper.create_embedded("source").unwrap();
    assert!(!detached.is_field_in_query("name"));
}

#[tokio::test]
async fn test_query_hash_bookkeeping() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let article = mapper.create("article").unwrap();

    article.add_query_hash("h1");
    article.add_query_hash("h2");
    assert_eq!(article.query_hashes(), vec!["h1", "h2"]);

    article.remove_query_hash("h1");
    assert_eq!(article.query_hashes(), vec!["h2"]);

    article.clear_query_hashes();
    assert!(article.query_hashes().is_empty());
}

#[tokio::test]
async fn test_value_equality_vs_instance_identity() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    let a = mapper.create("article").unwrap();
    let b = mapper.create("article").unwrap();
    a.set_document_data(&article_record(1, "t", 1), true, None).unwrap();
    b.set_document_data(&article_record(1, "t", 1), true, None).unwrap();

    assert!(!a.same_instance(&b));
    assert!(a.value_eq(&b));

    b.set("title", "other").unwrap();
    assert!(!a.value_eq(&b));
}

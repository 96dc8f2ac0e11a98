use rustodm::{
    DocumentMetadata, FieldType, Filter, Mapper, MemoryStore, OdmError, Record, Store, Value,
    ID_FIELD,
};
use std::sync::Arc;

fn build_mapper(store: Arc<MemoryStore>) -> Arc<Mapper> {
    Mapper::builder(store)
        .register(
            DocumentMetadata::new("article", "articles")
                .field("title", FieldType::Text)
                .field("score", FieldType::Integer)
                .embedded_many("comments", "comment"),
        )
        .register(DocumentMetadata::embedded("comment").field("body", FieldType::Text))
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
async fn test_find_by_ids_serves_residents_and_fetches_the_rest() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch(
            "articles",
            vec![article_record(1, "one", 1), article_record(2, "two", 2)],
        )
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();

    // make id 1 resident without going through the store
    let resident = mapper.create("article").unwrap();
    resident
        .set_document_data(&article_record(1, "one", 1), true, None)
        .unwrap();
    repository.identity_map().set("1", resident.clone());

    let found = repository
        .find_by_ids(&[Value::Integer(1), Value::Integer(2)])
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(found["1"].same_instance(&resident));
    assert_eq!(found["2"].get("title").unwrap(), Value::from("two"));
    // only ["2"] was sent to the store
    assert_eq!(store.stats().find_calls, 1);
}

#[tokio::test]
async fn test_find_one_by_id_caches_the_instance() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "one", 1)])
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();
    let first = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();
    let second = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();

    assert!(first.same_instance(&second));
    assert_eq!(store.stats().find_calls, 1);
    assert!(!first.is_new());
    assert!(first.is_field_in_query("score"));
}

#[tokio::test]
async fn test_save_skips_unmodified_documents() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "one", 1)])
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();
    let article = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();

    repository.save(&[article.clone()]).await.unwrap();
    assert_eq!(store.stats().update_calls, 0);

    article.set("title", "changed").unwrap();
    repository.save(&[article.clone()]).await.unwrap();
    assert_eq!(store.stats().update_calls, 1);
}

#[tokio::test]
async fn test_update_carries_only_dirty_state() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "one", 1)])
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();
    let article = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();

    article.set("title", "renamed").unwrap();
    repository.save(&[article.clone()]).await.unwrap();

    let records = store.records("articles");
    assert_eq!(records[0]["title"], Value::from("renamed"));
    // the untouched field survived because the update never mentioned it
    assert_eq!(records[0]["score"], Value::Integer(1));
    assert!(!article.is_modified());
}

#[tokio::test]
async fn test_save_new_document_with_embedded_members() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());

    let article = mapper.create("article").unwrap();
    article.set("title", "t").unwrap();
    let group = article.embedded_many("comments").unwrap();
    let comment = mapper.create_embedded("comment").unwrap();
    comment.set("body", "hello").unwrap();
    group.add(vec![comment.clone()]).unwrap();

    article.save().await.unwrap();

    let records = store.records("articles");
    assert_eq!(records.len(), 1);
    let comments = records[0]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(
        comments[0].as_map().unwrap()["body"],
        Value::from("hello")
    );

    // post-save state: clean, promoted, resident
    assert!(!article.is_modified());
    assert!(group.add_queue().is_empty());
    assert_eq!(comment.path().as_deref(), Some("comments.0"));
}

#[tokio::test]
async fn test_update_includes_modified_embedded_members() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    let mut record = article_record(1, "one", 1);
    let mut payload = std::collections::BTreeMap::new();
    payload.insert("body".to_string(), Value::from("old"));
    record.insert(
        "comments".to_string(),
        Value::Array(vec![Value::Map(payload)]),
    );
    store.insert_batch("articles", vec![record]).await.unwrap();

    let repository = mapper.repository("article").unwrap();
    let article = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();
    let group = article.embedded_many("comments").unwrap();
    group.all().unwrap()[0].set("body", "new").unwrap();

    repository.save(&[article.clone()]).await.unwrap();

    let records = store.records("articles");
    let comments = records[0]["comments"].as_array().unwrap();
    assert_eq!(comments[0].as_map().unwrap()["body"], Value::from("new"));
    assert!(!article.is_modified());
}

#[tokio::test]
async fn test_delete_requires_id_and_evicts() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch("articles", vec![article_record(1, "one", 1)])
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();
    let article = repository
        .find_one_by_id(&Value::Integer(1))
        .await
        .unwrap()
        .unwrap();

    repository.delete(&[article.clone()]).await.unwrap();
    assert_eq!(store.count("articles", Filter::All).await.unwrap(), 0);
    assert!(!repository.identity_map().has("1"));

    let unsaved = mapper.create("article").unwrap();
    assert!(matches!(
        repository.delete(&[unsaved]).await,
        Err(OdmError::MissingId(_))
    ));
}

#[tokio::test]
async fn test_repository_rejects_foreign_documents() {
    let store = Arc::new(MemoryStore::new());
    let mapper = Mapper::builder(store)
        .register(DocumentMetadata::new("article", "articles").field("title", FieldType::Text))
        .register(DocumentMetadata::new("category", "categories").field("name", FieldType::Text))
        .build();

    let category = mapper.create("category").unwrap();
    let repository = mapper.repository("article").unwrap();

    assert!(matches!(
        repository.save(&[category]).await,
        Err(OdmError::ExecutionError(_))
    ));
}

#[tokio::test]
async fn test_embedded_types_have_no_repository() {
    let mapper = build_mapper(Arc::new(MemoryStore::new()));
    assert!(mapper.repository("comment").is_err());
    assert!(mapper.create("comment").is_err());
}

#[tokio::test]
async fn test_count_and_passthroughs() {
    let store = Arc::new(MemoryStore::new());
    let mapper = build_mapper(store.clone());
    store
        .insert_batch(
            "articles",
            vec![article_record(1, "one", 1), article_record(2, "two", 2)],
        )
        .await
        .unwrap();

    let repository = mapper.repository("article").unwrap();
    assert_eq!(repository.count(Filter::All).await.unwrap(), 2);

    let mut bump = Record::new();
    bump.insert("score".to_string(), Value::Integer(9));
    repository
        .update(Filter::Ids(vec![Value::Integer(1)]), bump)
        .await
        .unwrap();
    let records = store.records("articles");
    assert_eq!(records[0]["score"], Value::Integer(9));

    repository.remove(Filter::All).await.unwrap();
    assert_eq!(repository.count(Filter::All).await.unwrap(), 0);
}

use rustodm::{
    DocumentMetadata, EmbeddedHandle, FieldType, Mapper, MemoryStore, OdmError, Record, Value,
    ID_FIELD,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn build_mapper() -> Arc<Mapper> {
    Mapper::builder(Arc::new(MemoryStore::new()))
        .register(
            DocumentMetadata::new("article", "articles")
                .field("title", FieldType::Text)
                .embedded_many("comments", "comment"),
        )
        .register(
            DocumentMetadata::embedded("comment")
                .field("body", FieldType::Text)
                .field("author", FieldType::Text),
        )
        .build()
}

fn comment_payload(body: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("body".to_string(), Value::from(body));
    Value::Map(map)
}

fn article_with_comments(mapper: &Arc<Mapper>, payloads: Vec<Value>) -> rustodm::DocumentHandle {
    let article = mapper.create("article").unwrap();
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::Integer(1));
    record.insert("title".to_string(), Value::from("t"));
    record.insert("comments".to_string(), Value::Array(payloads));
    article.set_document_data(&record, true, None).unwrap();
    article
}

fn new_comment(mapper: &Arc<Mapper>, body: &str) -> EmbeddedHandle {
    let comment = mapper.create_embedded("comment").unwrap();
    comment.set("body", body).unwrap();
    comment
}

#[tokio::test]
async fn test_add_does_not_deduplicate() {
    let mapper = build_mapper();
    let article = mapper.create("article").unwrap();
    let group = article.embedded_many("comments").unwrap();
    let comment = new_comment(&mapper, "hi");

    group.add(vec![comment.clone()]).unwrap();
    group.add(vec![comment.clone()]).unwrap();

    assert_eq!(group.count().unwrap(), 2);
}

#[tokio::test]
async fn test_replace_then_mark_all_saved_round_trip() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("old")]);
    let group = article.embedded_many("comments").unwrap();

    let a = new_comment(&mapper, "a");
    let b = new_comment(&mapper, "b");
    group.replace(vec![a.clone(), b.clone()]).unwrap();
    group.mark_all_saved().unwrap();

    let all = group.all().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].same_instance(&a));
    assert!(all[1].same_instance(&b));
    assert_eq!(group.count().unwrap(), 2);
    assert!(group.add_queue().is_empty());
    assert!(group.remove_queue().is_empty());
}

#[tokio::test]
async fn test_clear_is_a_marker_only() {
    let mapper = build_mapper();
    let article =
        article_with_comments(&mapper, vec![comment_payload("a"), comment_payload("b")]);
    let group = article.embedded_many("comments").unwrap();
    assert_eq!(group.count().unwrap(), 2);

    group.clear();

    assert!(group.clear_marker());
    // membership is untouched; clear only signals a modification
    assert_eq!(group.all().unwrap().len(), 2);
}

#[tokio::test]
async fn test_add_conflicts_with_pending_remove_on_nonempty_group() {
    let mapper = build_mapper();
    let article =
        article_with_comments(&mapper, vec![comment_payload("a"), comment_payload("b")]);
    let group = article.embedded_many("comments").unwrap();

    let first = group.all().unwrap()[0].clone();
    group.remove(vec![first]);

    let incoming = new_comment(&mapper, "c");
    assert!(matches!(
        group.add(vec![incoming]),
        Err(OdmError::ConflictingModification(_))
    ));
}

#[tokio::test]
async fn test_add_after_remove_emptied_the_group() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("x")]);
    let group = article.embedded_many("comments").unwrap();

    let x = group.all().unwrap()[0].clone();
    group.remove(vec![x]);

    let y = new_comment(&mapper, "y");
    group.add(vec![y.clone()]).unwrap();

    let all = group.all().unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].same_instance(&y));
    assert!(group.remove_queue().is_empty());
}

#[tokio::test]
async fn test_staged_add_paths_are_promoted() {
    let mapper = build_mapper();
    let article = mapper.create("article").unwrap();
    let group = article.embedded_many("comments").unwrap();

    let comment = new_comment(&mapper, "hi");
    group.add(vec![comment.clone()]).unwrap();
    assert_eq!(comment.path().as_deref(), Some("comments._add0"));
    assert!(comment.is_embedded_many_new());

    group.mark_all_saved().unwrap();
    assert_eq!(comment.path().as_deref(), Some("comments.0"));
    assert!(!comment.is_embedded_many_new());
    assert!(!comment.is_modified());
}

#[tokio::test]
async fn test_membership_merge_order_and_first_match_removal() {
    let mapper = build_mapper();
    let article =
        article_with_comments(&mapper, vec![comment_payload("a"), comment_payload("b")]);
    let group = article.embedded_many("comments").unwrap();

    let c = new_comment(&mapper, "c");
    group.add(vec![c.clone()]).unwrap();

    let all = group.all().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].get("body").unwrap(), Value::from("a"));
    assert_eq!(all[1].get("body").unwrap(), Value::from("b"));
    assert!(all[2].same_instance(&c));

    assert_eq!(group.one().unwrap().unwrap().get("body").unwrap(), Value::from("a"));
}

#[tokio::test]
async fn test_null_payload_entries_are_skipped() {
    let mapper = build_mapper();
    let article = article_with_comments(
        &mapper,
        vec![comment_payload("a"), Value::Null, comment_payload("b")],
    );
    let group = article.embedded_many("comments").unwrap();

    let all = group.all().unwrap();
    assert_eq!(all.len(), 2);
    // paths keep the raw payload positions
    assert_eq!(all[0].path().as_deref(), Some("comments.0"));
    assert_eq!(all[1].path().as_deref(), Some("comments.2"));
}

#[tokio::test]
async fn test_reset_clears_queues_and_invalidates_baseline() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = article.embedded_many("comments").unwrap();

    // reset without pending edits keeps the cached baseline
    let _ = group.all().unwrap();
    group.reset();
    assert!(group.is_saved_initialized());

    group.add(vec![new_comment(&mapper, "b")]).unwrap();
    group.reset();
    assert!(!group.is_saved_initialized());
    assert!(group.add_queue().is_empty());
    assert!(group.remove_queue().is_empty());
    // next access re-resolves from the raw payload
    assert_eq!(group.count().unwrap(), 1);
}

#[tokio::test]
async fn test_replace_with_empty_only_marks_clear() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = article.embedded_many("comments").unwrap();

    group.replace(vec![]).unwrap();

    assert!(group.clear_marker());
    assert_eq!(group.all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_modification_scenarios() {
    let mapper = build_mapper();

    // new root, staged add with a modified member
    let fresh = mapper.create("article").unwrap();
    let group = fresh.embedded_many("comments").unwrap();
    group.add(vec![new_comment(&mapper, "hi")]).unwrap();
    assert!(fresh.is_modified());

    // persisted root, staged add, baseline never materialized
    let persisted = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = persisted.embedded_many("comments").unwrap();
    group.add(vec![new_comment(&mapper, "hi")]).unwrap();
    assert!(persisted.is_modified());

    // persisted root, untouched initialized baseline
    let quiet = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = quiet.embedded_many("comments").unwrap();
    let _ = group.all().unwrap();
    assert!(!quiet.is_modified());

    // pending remove counts once the root is persisted
    let removing = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = removing.embedded_many("comments").unwrap();
    let member = group.all().unwrap()[0].clone();
    group.remove(vec![member]);
    assert!(removing.is_modified());

    // so does the clear marker
    let clearing = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = clearing.embedded_many("comments").unwrap();
    group.clear();
    assert!(clearing.is_modified());

    // a modified already-resolved saved member counts
    let touched = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = touched.embedded_many("comments").unwrap();
    group.all().unwrap()[0].set("body", "edited").unwrap();
    assert!(touched.is_modified());
}

#[tokio::test]
async fn test_clear_modified_promotes_membership() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = article.embedded_many("comments").unwrap();

    let b = new_comment(&mapper, "b");
    group.add(vec![b.clone()]).unwrap();
    assert!(article.is_modified());

    article.clear_modified();

    assert!(!article.is_modified());
    assert!(group.add_queue().is_empty());
    assert!(group.is_saved_initialized());
    assert_eq!(group.count().unwrap(), 2);
    // the staged-add marker is stripped in place, not re-indexed
    assert_eq!(b.path().as_deref(), Some("comments.0"));
}

#[tokio::test]
async fn test_baseline_materializes_once_per_generation() {
    let mapper = build_mapper();
    let article = article_with_comments(&mapper, vec![comment_payload("a")]);
    let group = article.embedded_many("comments").unwrap();

    let first = group.all().unwrap();
    let second = group.all().unwrap();
    assert!(first[0].same_instance(&second[0]));

    let refreshed = group.refresh_saved().unwrap();
    assert!(!refreshed[0].same_instance(&first[0]));
}

//! Catalogue persistence across store handles.

use nfstore_store::{CatalogueStore, Collection, MediaStore, StoreError, StoreLayout};
use serde_json::json;
use std::fs;

#[test]
fn documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let created = {
        let store = CatalogueStore::open(dir.path()).unwrap();
        store
            .create_with_id(Collection::Vnsfs, "cirros_vnfd", json!({"state": "sandboxed"}))
            .unwrap()
    };

    let store = CatalogueStore::open(dir.path()).unwrap();
    let fetched = store.get(Collection::Vnsfs, "cirros_vnfd").unwrap();
    assert_eq!(fetched, created);
}

#[test]
fn tokens_are_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let a = CatalogueStore::open(dir.path()).unwrap();
    let b = CatalogueStore::open(dir.path()).unwrap();

    let doc = a
        .create_with_id(Collection::NetworkServices, "ns1", json!({"n": 1}))
        .unwrap();
    b.update(Collection::NetworkServices, "ns1", &doc.etag, json!({"n": 2}))
        .unwrap();

    let err = a
        .delete(Collection::NetworkServices, "ns1", &doc.etag)
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[test]
fn stray_temp_files_are_ignored_by_list() {
    let dir = tempfile::tempdir().unwrap();
    let store = CatalogueStore::open(dir.path()).unwrap();
    store
        .create_with_id(Collection::Vnsfs, "v1", json!({}))
        .unwrap();
    fs::write(
        store
            .layout()
            .collection_dir(Collection::Vnsfs)
            .join(".tmpAbC123"),
        "{partial",
    )
    .unwrap();

    let ids: Vec<String> = store
        .list(Collection::Vnsfs)
        .unwrap()
        .into_iter()
        .map(|d| d.id.into_inner())
        .collect();
    assert_eq!(ids, vec!["v1".to_owned()]);
}

#[test]
fn media_and_documents_share_one_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = CatalogueStore::open(dir.path()).unwrap();
    let media = MediaStore::new(StoreLayout::new(dir.path()));

    let manifest = media.put(b"manifest:vnsf: {}\n").unwrap();
    store
        .create_with_id(
            Collection::Vnsfs,
            "v1",
            json!({"manifest_file": manifest.as_str()}),
        )
        .unwrap();

    let hits = store
        .get_by_field(Collection::Vnsfs, "manifest_file", manifest.as_str())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(media.get(&manifest).unwrap(), b"manifest:vnsf: {}\n");
}

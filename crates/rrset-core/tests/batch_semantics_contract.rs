//! Contract Test: Batch Semantics
//!
//! Constraints verified:
//! - Clearing an absent RRset is accepted and changes nothing
//! - Records are compared in canonical form, not by their spelling
//! - Items addressing the same (subname, type) reference each other's positions
//! - Automatically managed types are refused outright
//! - A subname holding a CNAME holds nothing else once the batch is applied
//! - Update fills omitted fields from the stored RRset; create does not
//! - Structural problems in JSON payloads are reported per position

mod common;

use common::*;
use rrset_core::{Batch, BatchOperation, ChangeItem, Error, ErrorKind, RrsetStore};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn clearing_an_absent_rrset_is_idempotent() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, mut changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    for _ in 0..2 {
        let outcome = reconciler
            .apply(
                &owner(),
                DOMAIN,
                BatchOperation::Replace,
                Batch::list([ChangeItem::clearing("nothing", "TXT")]),
            )
            .await
            .unwrap();
        assert!(outcome.rrsets().is_empty());
        assert!(outcome.deleted().is_empty());
    }

    assert!(
        !reconciler
            .delete(&owner(), DOMAIN, "nothing", "TXT")
            .await
            .unwrap()
    );
    assert_eq!(store.upsert_calls(), 0, "nothing to write for absent keys");
    assert!(changes.try_recv().is_err(), "no-ops are not announced");
}

#[tokio::test]
async fn equivalent_spellings_are_duplicates() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(
                ChangeItem::new("v6", "AAAA")
                    .with_ttl(3600)
                    .with_records(["2001:db8::1", "2001:0DB8:0:0:0:0:0:0001"]),
            ),
        )
        .await
        .unwrap_err();

    let errors = err.batch_errors().unwrap();
    assert!(errors.is_single());
    assert!(errors.items()[0].messages("non_field_errors")[0].contains("Duplicate record content"));
    assert!(errors.items()[0].has_kind(ErrorKind::Conflict));
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn adding_an_equivalent_spelling_by_update_is_a_duplicate() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::new("v6", "AAAA").with_ttl(3600).with_records(["::1"])),
        )
        .await
        .unwrap();

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Update,
            Batch::single(ChangeItem::new("v6", "AAAA").with_records(["::1", "::0001"])),
        )
        .await
        .unwrap_err();

    let errors = err.batch_errors().unwrap();
    assert!(errors.items()[0].messages("non_field_errors")[0].contains("Duplicate record content"));
    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(
        stored_records(store.as_ref(), "v6", "AAAA").await,
        Some(vec!["::1".to_string()])
    );
}

#[tokio::test]
async fn rewriting_the_same_content_in_another_spelling_changes_nothing() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, mut changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::new("mx", "MX").with_ttl(3600).with_records(["10 Mail.Example.COM."])),
        )
        .await
        .unwrap();
    changes.recv().await.unwrap();
    let before = reconciler.get(&owner(), DOMAIN, "mx", "MX").await.unwrap();
    assert_eq!(before.records, vec!["10 mail.example.com."]);

    let outcome = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Replace,
            Batch::single(ChangeItem::new("mx", "MX").with_ttl(3600).with_records(["010 mail.example.com."])),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rrsets()[0].records, before.records);
    assert_eq!(outcome.rrsets()[0].touched, before.touched);
    assert!(changes.try_recv().is_err());
    assert_eq!(store.upsert_calls(), 1);
}

#[tokio::test]
async fn repeated_keys_reference_each_other() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Update,
            Batch::list([
                ChangeItem::new("www", "A").with_ttl(3600).with_records(["192.0.2.1"]),
                ChangeItem::new("other", "A").with_ttl(3600).with_records(["192.0.2.2"]),
                ChangeItem::new("www", "A").with_ttl(3600).with_records(["192.0.2.3"]),
            ]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    let errors = err.batch_errors().unwrap();
    assert_eq!(
        errors.items()[0].messages("non_field_errors"),
        ["Same subname and type as in position(s) 2, but must be unique."]
    );
    assert!(errors.items()[1].is_empty());
    assert_eq!(
        errors.items()[2].messages("non_field_errors"),
        ["Same subname and type as in position(s) 0, but must be unique."]
    );
    assert_eq!(stored_records(store.as_ref(), "other", "A").await, None);
}

#[tokio::test]
async fn managed_types_are_a_policy_violation() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::list([
                ChangeItem::new("", "TXT").with_ttl(3600).with_records(["\"fine\""]),
                ChangeItem::new("", "RRSIG").with_ttl(3600).with_records(["whatever"]),
            ]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    let errors = err.batch_errors().unwrap();
    assert!(errors.items()[0].is_empty());
    assert_eq!(
        errors.items()[1].messages("type"),
        ["You cannot tinker with the RRSIG RR set. It is managed automatically."]
    );
    assert_eq!(stored_records(store.as_ref(), "", "TXT").await, None);
}

#[tokio::test]
async fn replacing_one_type_by_a_cname_in_one_batch() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::new("alias", "AAAA").with_ttl(3600).with_records(["2001:db8::1"])),
        )
        .await
        .unwrap();

    let outcome = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Replace,
            Batch::list([
                ChangeItem::clearing("alias", "AAAA"),
                ChangeItem::new("alias", "CNAME").with_ttl(3601).with_records(["example.com."]),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rrsets().len(), 1);
    assert_eq!(outcome.rrsets()[0].rtype, "CNAME");
    assert_eq!(outcome.rrsets()[0].ttl, 3601);
    assert_eq!(stored_records(store.as_ref(), "alias", "AAAA").await, None);
    assert_eq!(
        stored_records(store.as_ref(), "alias", "CNAME").await,
        Some(vec!["example.com.".to_string()])
    );
}

#[tokio::test]
async fn cname_next_to_stored_type_is_rejected() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::new("alias", "TXT").with_ttl(3600).with_records(["\"x\""])),
        )
        .await
        .unwrap();

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::list([
                ChangeItem::new("alias", "CNAME").with_ttl(3600).with_records(["example.com."]),
                ChangeItem::new("alias", "A").with_ttl(3600).with_records(["192.0.2.1"]),
            ]),
        )
        .await
        .unwrap_err();

    let errors = err.batch_errors().unwrap();
    assert_eq!(
        errors.items()[0].messages("non_field_errors"),
        ["RRset with conflicting type present in request index 1 (A), database (TXT). (No other RRsets are allowed alongside CNAME.)"]
    );
    assert_eq!(
        errors.items()[1].messages("non_field_errors"),
        ["RRset with conflicting type present in request index 0 (CNAME). (No other RRsets are allowed alongside CNAME.)"]
    );
    assert_eq!(stored_records(store.as_ref(), "alias", "A").await, None);
}

#[tokio::test]
async fn update_fills_omitted_fields_from_storage() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::new("www", "A").with_ttl(3600).with_records(["192.0.2.1"])),
        )
        .await
        .unwrap();

    let ttl_only = ChangeItem::new("www", "A").with_ttl(7200);
    let outcome = reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Update, Batch::single(ttl_only))
        .await
        .unwrap();
    assert_eq!(outcome.rrsets()[0].ttl, 7200);
    assert_eq!(outcome.rrsets()[0].records, vec!["192.0.2.1"]);

    let records_only = ChangeItem::new("www", "A").with_records(["192.0.2.9"]);
    let outcome = reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Update, Batch::single(records_only))
        .await
        .unwrap();
    assert_eq!(outcome.rrsets()[0].ttl, 7200);
    assert_eq!(outcome.rrsets()[0].records, vec!["192.0.2.9"]);

    // replace demands every field
    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Replace,
            Batch::single(ChangeItem::new("www", "A").with_records(["192.0.2.1"])),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.batch_errors().unwrap().items()[0].messages("ttl"),
        ["This field is required."]
    );
}

#[tokio::test]
async fn create_rejects_empty_records_and_existing_keys() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let err = reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::single(ChangeItem::clearing("www", "A").with_ttl(3600)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.batch_errors().unwrap().items()[0].messages("records"),
        ["This field must not be empty when creating."]
    );

    let item = ChangeItem::new("www", "A").with_ttl(3600).with_records(["192.0.2.1"]);
    reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Create, Batch::single(item.clone()))
        .await
        .unwrap();
    let err = reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Create, Batch::single(item))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        err.batch_errors().unwrap().items()[0].messages("non_field_errors"),
        ["Another RRset with the same subdomain and type exists for this domain. (Try modifying it.)"]
    );
}

#[tokio::test]
async fn structural_errors_are_positional() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, _changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let batch = Batch::from_json(&json!([
        {"subname": "ok", "type": "A", "ttl": 3600, "records": ["192.0.2.1"]},
        {"subname": "bad", "type": "A", "ttl": "long", "records": ["192.0.2.1"]},
        "not an item",
    ]))
    .unwrap();

    let err = reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Create, batch)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected(_)));
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(
        serde_json::to_value(err.batch_errors().unwrap()).unwrap(),
        json!([
            {},
            {"ttl": ["A valid integer is required."]},
            {"non_field_errors": ["Expected an object, but got string."]},
        ])
    );
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, mut changes) = reconciler_with_domain(store.clone(), fast_config()).await;

    let outcome = reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Replace, Batch::list([]))
        .await
        .unwrap();
    assert!(outcome.rrsets().is_empty());
    assert!(changes.try_recv().is_err());
    assert!(store.list(DOMAIN, &Default::default()).await.unwrap().is_empty());
}

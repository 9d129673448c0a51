use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use form_spec::{
    AssociationStrategy, BackendError, Backends, BlobStrategy, CompositePart, CompositeStrategy,
    Datastore, FileStore, KeyValueStore, MembershipStore, MemoryStore, OwnerId, Persistence,
    PersistenceError, RowStrategy, WizardSpec,
};

const OWNER: OwnerId = OwnerId(42);

/// Key-value store that refuses writes to one key and reads of another.
#[derive(Debug)]
struct Flaky {
    inner: MemoryStore,
    broken_write: &'static str,
    broken_read: &'static str,
}

impl Flaky {
    fn new(broken_write: &'static str, broken_read: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            broken_write,
            broken_read,
        }
    }
}

impl KeyValueStore for Flaky {
    fn get(&self, owner: OwnerId, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        if key == self.broken_read {
            return Err(BackendError::new("disk on fire"));
        }
        KeyValueStore::get(&self.inner, owner, key)
    }

    fn set(&self, owner: OwnerId, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        if key == self.broken_write {
            return Err(BackendError::new("disk full"));
        }
        self.inner.set(owner, key, bytes)
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), BackendError> {
        KeyValueStore::delete(&self.inner, owner, key)
    }
}

#[test]
fn blob_subkeys_do_not_clobber_each_other() {
    let store = Arc::new(MemoryStore::new());
    let blob = BlobStrategy::new(store.clone(), "listing_meta");
    let values = [
        json!("a@b.com"),
        json!(12),
        json!(["x", "y"]),
        json!({ "nested": { "deep": true } }),
    ];
    for x in &values {
        for y in &values {
            blob.save(OWNER, "a", x).expect("save a");
            blob.save(OWNER, "b", y).expect("save b");
            assert_eq!(blob.load(OWNER, "a"), *x);
            assert_eq!(blob.load(OWNER, "b"), *y);
        }
    }
    assert_eq!(store.row_count(OWNER), 1, "one physical row for every sub-key");
}

#[test]
fn blob_removes_emptied_subkeys_and_row() {
    let store = Arc::new(MemoryStore::new());
    let blob = BlobStrategy::new(store.clone(), "meta");
    blob.save(OWNER, "phone", &json!("555")).expect("save");
    blob.save(OWNER, "email", &json!("a@b.com")).expect("save");

    blob.save(OWNER, "phone", &json!("")).expect("clear");
    assert!(!blob.read_row(OWNER).contains_key("phone"));
    assert_eq!(blob.load(OWNER, "email"), json!("a@b.com"));

    blob.delete(OWNER, "email").expect("delete");
    assert!(blob.read_row(OWNER).is_empty());
    assert_eq!(store.row_count(OWNER), 0);
}

#[test]
fn blob_corrupt_row_reads_as_empty() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(OWNER, "meta", b"definitely not cbor".to_vec())
        .expect("raw write");
    let blob = BlobStrategy::new(store, "meta");
    assert_eq!(blob.load(OWNER, "email"), json!(null));
}

#[test]
fn row_strategy_round_trips_and_deletes_on_null() {
    let store = Arc::new(MemoryStore::new());
    let rows = RowStrategy::new(store.clone());
    rows.save(OWNER, "email", &json!("a@b.com")).expect("save");
    rows.save(OWNER, "title", &json!("Cafe")).expect("save");
    assert_eq!(rows.load(OWNER, "email"), json!("a@b.com"));
    assert_eq!(store.row_count(OWNER), 2);

    rows.save(OWNER, "email", &json!(null)).expect("null save");
    assert_eq!(rows.load(OWNER, "email"), json!(null));
    assert_eq!(store.row_count(OWNER), 1);
}

#[test]
fn reads_degrade_and_writes_surface_errors() {
    let rows = RowStrategy::new(Arc::new(Flaky::new("email", "title")));
    assert_eq!(rows.load(OWNER, "title"), json!(null));

    let err = rows.save(OWNER, "email", &json!("a@b.com")).expect_err("write fails");
    match err {
        PersistenceError::Backend { owner, key, source } => {
            assert_eq!(owner, OWNER);
            assert_eq!(key, "email");
            assert_eq!(source.to_string(), "disk full");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn association_replace_is_idempotent_and_clearable() {
    let store = Arc::new(MemoryStore::new());
    let categories = AssociationStrategy::new(store.clone(), "category");

    categories.save(OWNER, "category", &json!([1, 2, 3])).expect("save");
    categories.save(OWNER, "category", &json!([3, "2", 1])).expect("save again");
    assert_eq!(categories.load(OWNER, "category"), json!([1, 2, 3]));
    assert_eq!(
        MembershipStore::get(store.as_ref(), OWNER, "category").expect("get"),
        BTreeSet::from([1, 2, 3])
    );

    categories.save(OWNER, "category", &json!([])).expect("clear");
    assert_eq!(categories.load(OWNER, "category"), json!([]));

    store
        .replace(OWNER, "tag", &BTreeSet::from([5]))
        .expect("replace");
    store
        .replace(OWNER, "tag", &BTreeSet::from([5]))
        .expect("replace");
    assert_eq!(
        MembershipStore::get(store.as_ref(), OWNER, "tag").expect("get"),
        BTreeSet::from([5])
    );
}

#[test]
fn geolocation_composite_fans_out_and_synthesizes_defaults() {
    let store = Arc::new(MemoryStore::new());
    let inner: Arc<dyn Datastore> = Arc::new(RowStrategy::new(store.clone()));
    let location = CompositeStrategy::geolocation("location", inner.clone());

    assert_eq!(
        location.load(OWNER, "location"),
        json!({ "address": "", "lat": null, "lng": null, "coordinates": "" })
    );

    location
        .save(
            OWNER,
            "location",
            &json!({ "address": "1 Main St", "lat": 51.5, "lng": -0.12 }),
        )
        .expect("save");
    assert_eq!(inner.load(OWNER, "location_address"), json!("1 Main St"));
    assert_eq!(inner.load(OWNER, "location_coordinates"), json!("51.5,-0.12"));
    assert_eq!(
        location.load(OWNER, "location"),
        json!({
            "address": "1 Main St",
            "lat": 51.5,
            "lng": -0.12,
            "coordinates": "51.5,-0.12"
        })
    );

    // Partial values persist partially.
    location
        .save(OWNER, "location", &json!({ "address": "2 High St" }))
        .expect("save");
    assert_eq!(inner.load(OWNER, "location_address"), json!("2 High St"));
    assert_eq!(inner.load(OWNER, "location_lat"), json!(51.5));
}

#[test]
fn composite_write_failure_keeps_earlier_writes() {
    let store = Arc::new(Flaky::new("hours_wednesday", ""));
    let inner: Arc<dyn Datastore> = Arc::new(RowStrategy::new(store.clone()));
    let hours = CompositeStrategy::opening_hours("hours", inner.clone());

    let value = json!({
        "monday": { "open": "09:00", "close": "17:00" },
        "wednesday": { "open": "09:00", "close": "12:00" },
        "friday": { "open": "10:00", "close": "16:00" }
    });
    let err = hours.save(OWNER, "hours", &value).expect_err("wednesday fails");
    assert!(matches!(err, PersistenceError::Backend { ref key, .. } if key == "hours_wednesday"));

    assert_eq!(inner.load(OWNER, "hours_monday"), value["monday"]);
    assert_eq!(inner.load(OWNER, "hours_friday"), json!(null));
}

#[test]
fn custom_composite_parts() {
    let store = Arc::new(MemoryStore::new());
    let inner: Arc<dyn Datastore> = Arc::new(RowStrategy::new(store));
    let price = CompositeStrategy::new(
        vec![
            CompositePart::new("amount", "price_amount"),
            CompositePart::new("currency", "price_currency").with_default(json!("EUR")),
        ],
        inner,
    );
    assert_eq!(price.load(OWNER, "price"), json!({ "amount": null, "currency": "EUR" }));

    price
        .save(OWNER, "price", &json!({ "amount": 12, "currency": "" }))
        .expect("save");
    assert_eq!(price.load(OWNER, "price"), json!({ "amount": 12, "currency": "EUR" }));

    price.delete(OWNER, "price").expect("delete");
    assert_eq!(price.load(OWNER, "price"), json!({ "amount": null, "currency": "EUR" }));
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("forms.cbor");

    {
        let store = Arc::new(FileStore::open(&path).expect("open"));
        BlobStrategy::new(store.clone(), "meta")
            .save(OWNER, "email", &json!("a@b.com"))
            .expect("save");
        AssociationStrategy::new(store, "category")
            .save(OWNER, "category", &json!([4, 2]))
            .expect("save");
    }

    let store = Arc::new(FileStore::open(&path).expect("reopen"));
    assert_eq!(
        BlobStrategy::new(store.clone(), "meta").load(OWNER, "email"),
        json!("a@b.com")
    );
    assert_eq!(
        AssociationStrategy::new(store, "category").load(OWNER, "category"),
        json!([2, 4])
    );
}


#[test]
fn routed_fields_persist_through_file_backend() {
    let spec: WizardSpec =
        serde_json::from_str(include_str!("fixtures/listing_wizard.json")).expect("fixture");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("forms.cbor");

    {
        let store = Arc::new(FileStore::open(&path).expect("open"));
        let persistence = Persistence::for_fields(&spec.form.fields, &Backends::file(store));
        assert!(persistence.handles("title") && persistence.handles("category"));
        persistence
            .save(OWNER, "title", &json!("Blue Cafe"))
            .expect("row save");
        persistence
            .save(OWNER, "email", &json!("cafe@example.com"))
            .expect("blob save");
        persistence
            .save(OWNER, "category", &json!([7]))
            .expect("terms save");
    }

    let store = Arc::new(FileStore::open(&path).expect("reopen"));
    let persistence = Persistence::for_fields(&spec.form.fields, &Backends::file(store));
    assert_eq!(persistence.load(OWNER, "title"), json!("Blue Cafe"));
    assert_eq!(persistence.load(OWNER, "email"), json!("cafe@example.com"));
    assert_eq!(persistence.load(OWNER, "category"), json!([7]));
}

//! Store behavior tests: idempotence, foreign-key integrity, concurrency.

use super::*;
use chrono::TimeZone;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_bundle(source_file: &str, number: &str) -> Bundle {
    Bundle::new(
        Certificate {
            id: None,
            certificate_number: number.to_string(),
            license_number: "LIC-SP-12345".to_string(),
            company_name: "Empresa Teste LTDA".to_string(),
            trade_name: "Teste Corp".to_string(),
            tax_id: "11.222.333/0001-81".to_string(),
            address: "Rua Teste, 123, Centro, São Paulo".to_string(),
            issue_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            expiry_date: chrono::NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
            treated_pests: "Baratas, Formigas, Ratos".to_string(),
            source_file: source_file.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
                + chrono::Duration::microseconds(123_456),
            amount: Some("1250.00".to_string()),
            district: Some("Centro".to_string()),
            city: Some("São Paulo".to_string()),
        },
        vec![
            ChemicalProduct {
                name: "Inseticida Alpha".to_string(),
                chemical_class: "Piretroide".to_string(),
                concentration: Some(2.5),
            },
            ChemicalProduct {
                name: "Raticida Beta".to_string(),
                chemical_class: "Anticoagulante".to_string(),
                concentration: None,
            },
        ],
        vec![ApplicationMethod {
            description: "Pulverização".to_string(),
            quantity: "200 ml".to_string(),
        }],
    )
}

#[test]
fn open_creates_files_with_header_rows() {
    let dir = tempdir().unwrap();
    let _store = CsvStore::open(dir.path()).unwrap();

    let certificates = std::fs::read_to_string(dir.path().join(CSV_CERTIFICATES)).unwrap();
    assert_eq!(
        certificates.lines().next().unwrap(),
        CERTIFICATE_HEADERS.join(",")
    );
    let products = std::fs::read_to_string(dir.path().join(CSV_PRODUCTS)).unwrap();
    assert_eq!(products.lines().next().unwrap(), PRODUCT_HEADERS.join(","));
    let methods = std::fs::read_to_string(dir.path().join(CSV_METHODS)).unwrap();
    assert_eq!(methods.lines().next().unwrap(), METHOD_HEADERS.join(","));
}

#[test]
fn open_is_repeatable_without_clobbering_data() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    store
        .upsert(&sample_bundle("upload-001.json", "CERT-1"), true)
        .unwrap();

    let reopened = CsvStore::open(dir.path()).unwrap();
    assert_eq!(reopened.list().unwrap().len(), 1);
}

#[test]
fn upsert_then_find_round_trips_every_field() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    let bundle = sample_bundle("upload-001.json", "CERT-2024-001");

    let stored = store.upsert(&bundle, true).unwrap();
    assert!(stored.id.is_some());

    let loaded = store.find_by_number("CERT-2024-001").unwrap().unwrap();
    assert_eq!(loaded.certificate.id, stored.id);
    assert_eq!(loaded.certificate.certificate_number, "CERT-2024-001");
    assert_eq!(loaded.certificate.license_number, "LIC-SP-12345");
    assert_eq!(loaded.certificate.company_name, "Empresa Teste LTDA");
    assert_eq!(loaded.certificate.trade_name, "Teste Corp");
    assert_eq!(loaded.certificate.tax_id, "11.222.333/0001-81");
    assert_eq!(
        loaded.certificate.address,
        "Rua Teste, 123, Centro, São Paulo"
    );
    assert_eq!(loaded.certificate.issue_date, bundle.certificate.issue_date);
    assert_eq!(loaded.certificate.expiry_date, bundle.certificate.expiry_date);
    assert_eq!(loaded.certificate.created_at, bundle.certificate.created_at);
    assert_eq!(loaded.certificate.amount.as_deref(), Some("1250.00"));
    assert_eq!(loaded.certificate.district.as_deref(), Some("Centro"));
    assert_eq!(loaded.certificate.city.as_deref(), Some("São Paulo"));
    assert_eq!(loaded.products, bundle.products);
    assert_eq!(loaded.methods, bundle.methods);
}

#[test]
fn duplicate_origin_is_returned_unchanged() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    let bundle = sample_bundle("upload-001.json", "CERT-1");

    let first = store.upsert(&bundle, true).unwrap();
    let second = store.upsert(&bundle, true).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.list().unwrap().len(), 1);

    // Exactly one set of child rows.
    let loaded = store.find_by_source("upload-001.json").unwrap().unwrap();
    assert_eq!(loaded.products.len(), 2);
    assert_eq!(loaded.methods.len(), 1);
}

#[test]
fn disabling_dedup_creates_distinct_identities() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    let first = sample_bundle("upload-001.json", "CERT-1");
    let mut second = sample_bundle("upload-001.json", "CERT-1");
    second.certificate.created_at = first.certificate.created_at + chrono::Duration::seconds(1);

    let a = store.upsert(&first, false).unwrap();
    let b = store.upsert(&second, false).unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(store.list().unwrap().len(), 2);
}

#[test]
fn identity_collision_with_different_origin_is_an_error() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    // Same tax id, number and timestamp hash to the same identity even
    // though the origin differs.
    let first = sample_bundle("upload-001.json", "CERT-1");
    let second = sample_bundle("upload-002.json", "CERT-1");

    store.upsert(&first, true).unwrap();
    let err = store.upsert(&second, true).unwrap_err();
    assert!(matches!(err, StoreError::IdentityCollision(_)));
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn children_never_leak_between_parents() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    let mut first = sample_bundle("upload-001.json", "CERT-1");
    first.products[0].name = "Only In First".to_string();
    let mut second = sample_bundle("upload-002.json", "CERT-2");
    second.certificate.created_at += chrono::Duration::seconds(5);
    second.products = vec![ChemicalProduct {
        name: "Only In Second".to_string(),
        chemical_class: "Organofosforado".to_string(),
        concentration: Some(0.005),
    }];
    second.methods = vec![];

    store.upsert(&first, true).unwrap();
    store.upsert(&second, true).unwrap();

    let loaded_first = store.find_by_source("upload-001.json").unwrap().unwrap();
    assert_eq!(loaded_first.products.len(), 2);
    assert_eq!(loaded_first.products[0].name, "Only In First");
    assert_eq!(loaded_first.methods.len(), 1);

    let loaded_second = store.find_by_number("CERT-2").unwrap().unwrap();
    assert_eq!(loaded_second.products.len(), 1);
    assert_eq!(loaded_second.products[0].name, "Only In Second");
    assert!(loaded_second.methods.is_empty());
}

#[test]
fn find_by_number_returns_first_match_when_numbers_repeat() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    let first = sample_bundle("upload-001.json", "CERT-1");
    let mut reissued = sample_bundle("upload-002.json", "CERT-1");
    reissued.certificate.created_at += chrono::Duration::seconds(60);

    store.upsert(&first, true).unwrap();
    store.upsert(&reissued, true).unwrap();

    let found = store.find_by_number("CERT-1").unwrap().unwrap();
    assert_eq!(found.certificate.source_file, "upload-001.json");
}

#[test]
fn absent_records_are_none_not_errors() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    assert!(store.find_by_source("missing.json").unwrap().is_none());
    assert!(store.find_by_number("CERT-404").unwrap().is_none());
}

#[test]
fn list_preserves_insertion_order() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    for i in 0..4 {
        let mut bundle = sample_bundle(&format!("upload-{i:03}.json"), &format!("CERT-{i}"));
        bundle.certificate.created_at += chrono::Duration::seconds(i);
        store.upsert(&bundle, true).unwrap();
    }

    let numbers: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|c| c.certificate_number)
        .collect();
    assert_eq!(numbers, vec!["CERT-0", "CERT-1", "CERT-2", "CERT-3"]);
}

#[test]
fn quoted_field_values_survive_storage() {
    let dir = tempdir().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    let mut bundle = sample_bundle("upload-001.json", "CERT-1");
    bundle.certificate.address = "Av. \"Central\", 500, Sala 2".to_string();
    bundle.certificate.treated_pests = "Baratas\nRatos".to_string();

    store.upsert(&bundle, true).unwrap();
    let loaded = store.find_by_source("upload-001.json").unwrap().unwrap();
    assert_eq!(loaded.certificate.address, "Av. \"Central\", 500, Sala 2");
    assert_eq!(loaded.certificate.treated_pests, "Baratas\nRatos");
}

#[test]
fn concurrent_upserts_with_distinct_origins_store_every_record() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CsvStore::open(dir.path()).unwrap());
    let threads = 8;

    std::thread::scope(|scope| {
        for i in 0..threads {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                let mut bundle =
                    sample_bundle(&format!("upload-{i:03}.json"), &format!("CERT-{i}"));
                bundle.certificate.created_at += chrono::Duration::microseconds(i);
                store.upsert(&bundle, true).unwrap();
            });
        }
    });

    assert_eq!(store.list().unwrap().len(), threads as usize);
}

#[test]
fn concurrent_upserts_with_one_origin_store_a_single_record() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CsvStore::open(dir.path()).unwrap());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                store
                    .upsert(&sample_bundle("upload-001.json", "CERT-1"), true)
                    .unwrap();
            });
        }
    });

    assert_eq!(store.list().unwrap().len(), 1);
}

use gatorpark_core::{GarageRegistry, OccupancyStore, RegistryError};
use std::io::Write;

#[test]
fn test_loads_seed_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"name": "Rawlings", "latitude": 29.645255, "longitude": -82.342954, "capacity": 12}},
            {{"name": "Garage B", "latitude": 29.655, "longitude": -82.330, "currentCount": 4, "isOpen": false}}
        ]"#
    )
    .unwrap();

    let registry = GarageRegistry::load(file.path()).unwrap();
    assert_eq!(registry.len(), 2);

    let store = OccupancyStore::detached(&registry);
    let garages = store.snapshot();
    assert_eq!(garages[0].name, "Rawlings");
    assert_eq!(garages[1].current_count, 4);
    assert_eq!(garages[1].capacity, 100);
    assert!(!garages[1].is_open);
}

#[test]
fn test_missing_seed_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garages.json");

    match GarageRegistry::load(&path) {
        Err(RegistryError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn test_malformed_seed_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"name": "not an array"}}"#).unwrap();
    assert!(matches!(
        GarageRegistry::load(file.path()),
        Err(RegistryError::Parse(_))
    ));
}

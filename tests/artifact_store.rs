//! Artifact Store Integration Tests
//!
//! Tests for deterministic plan locations.

use infracompare::{ArtifactStore, Provider};
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn test_location_is_stable_across_writes() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());
    let run_id = Uuid::new_v4();

    let before = store.location_of(run_id, Provider::Azure);
    let written = store
        .write(run_id, Provider::Azure, "resource \"azurerm_resource_group\" \"rg\" {}")
        .await
        .unwrap();
    let after = store.location_of(run_id, Provider::Azure);

    assert_eq!(before, written);
    assert_eq!(before, after);
    assert!(store.definition_path(run_id, Provider::Azure).starts_with(&before));
}

#[test]
fn test_locations_separate_runs_and_providers() {
    let store = ArtifactStore::new("/plans");
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    assert_ne!(
        store.location_of(first, Provider::Aws),
        store.location_of(first, Provider::Azure)
    );
    assert_ne!(
        store.location_of(first, Provider::Aws),
        store.location_of(second, Provider::Aws)
    );

    // Same store root, same inputs, same answer
    let other = ArtifactStore::new("/plans");
    assert_eq!(
        store.location_of(first, Provider::Aws),
        other.location_of(first, Provider::Aws)
    );
}

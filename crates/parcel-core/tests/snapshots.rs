mod support;

use parcel_core::deploy::{DeployRequest, DeployStatus, RefreshStatus};
use parcel_core::error::DeployError;
use parcel_core::model::FileRef;
use parcel_core::source::{MavenCoordinate, PackageSource};
use parcel_core::store::{BlobStore, NewBlob};
use parcel_core::types::{BlobType, PackageId};

use support::{Harness, plan_only_package, sample_package};

fn coordinate(raw: &str) -> MavenCoordinate {
    MavenCoordinate::parse(raw).unwrap()
}

fn snapshot_package() -> MavenCoordinate {
    coordinate("mvn:org.acme:pkg:1.0-SNAPSHOT")
}

fn snapshot_library() -> MavenCoordinate {
    coordinate("mvn:org.acme:lib:1.0-SNAPSHOT")
}

fn deploy_with_library(harness: &Harness, name: &str, library: &MavenCoordinate) -> Result<PackageId, DeployError> {
    deploy_with_library_request(harness, name, library, |request| request)
}

fn library_request(name: &str, library: &MavenCoordinate) -> DeployRequest {
    DeployRequest::create_or_update(PackageSource::upload(
        format!("{}.zip", name),
        sample_package(name, b"run()"),
    ))
    .with_library(PackageSource::remote(library.clone()))
}

fn deploy_with_library_request(
    harness: &Harness,
    name: &str,
    library: &MavenCoordinate,
    configure: impl FnOnce(DeployRequest) -> DeployRequest,
) -> Result<PackageId, DeployError> {
    harness
        .manager
        .deploy(configure(library_request(name, library)))
        .map(|outcome| outcome.package_id)
}

fn keyword_body(harness: &Harness, id: &PackageId) -> Vec<u8> {
    let keyword = harness.manager.owned_entities(id).unwrap().keywords.remove(0);
    let blob = keyword.file.as_ref().and_then(FileRef::as_blob).cloned().unwrap();
    harness.blobs.content(&blob).unwrap().unwrap()
}

#[test]
fn remote_package_is_cached_under_its_coordinate() {
    let harness = Harness::new();
    let origin = snapshot_package();
    harness
        .repository
        .publish(&origin, 100, sample_package("P", b"v1"));

    let outcome = harness
        .manager
        .deploy(DeployRequest::create(PackageSource::remote(origin.clone())))
        .unwrap();

    let package = harness.package(&outcome.package_id);
    let blob = harness.blob(package.archive_blob.as_ref().unwrap());
    assert_eq!(blob.origin.as_deref(), Some("mvn:org.acme:pkg:1.0-SNAPSHOT"));
    assert_eq!(blob.origin_timestamp, Some(100));
    assert_eq!(blob.owner, None);
    assert_eq!(package.file_name.as_deref(), Some("pkg-1.0-SNAPSHOT.jar"));
}

#[test]
fn unchanged_snapshot_keeps_the_stored_content() {
    let harness = Harness::new();
    let origin = snapshot_package();
    harness
        .repository
        .publish(&origin, 100, sample_package("P", b"v1"));
    let first = harness
        .manager
        .deploy(DeployRequest::create(PackageSource::remote(origin.clone())))
        .unwrap();
    let blob_id = harness.package(&first.package_id).archive_blob.unwrap();
    let hash = harness.blob(&blob_id).content_hash;

    let second = harness
        .manager
        .deploy(DeployRequest::update(PackageSource::remote(origin)))
        .unwrap();

    assert_eq!(second.status, DeployStatus::Updated);
    assert_eq!(harness.package(&second.package_id).archive_blob, Some(blob_id.clone()));
    assert_eq!(harness.blob(&blob_id).content_hash, hash);
    assert_eq!(harness.repository.downloads(), 1);
}

#[test]
fn advanced_snapshot_rewrites_the_blob_in_place() {
    let harness = Harness::new();
    let origin = snapshot_package();
    harness
        .repository
        .publish(&origin, 100, sample_package("P", b"v1"));
    let first = harness
        .manager
        .deploy(DeployRequest::create(PackageSource::remote(origin.clone())))
        .unwrap();
    let blob_id = harness.package(&first.package_id).archive_blob.unwrap();
    let old_hash = harness.blob(&blob_id).content_hash;

    harness
        .repository
        .publish(&origin, 200, sample_package("P", b"v2"));
    let second = harness
        .manager
        .deploy(DeployRequest::update(PackageSource::remote(origin)))
        .unwrap();

    assert_eq!(second.package_id, first.package_id);
    let blob = harness.blob(&blob_id);
    assert_ne!(blob.content_hash, old_hash);
    assert_eq!(blob.origin_timestamp, Some(200));
    assert_eq!(harness.blobs.len(), 2, "archive blob plus one keyword file");
}

#[test]
fn release_libraries_are_shared_without_conflict() {
    let harness = Harness::new();
    let release = coordinate("mvn:org.acme:lib:1.0");
    harness.repository.publish(&release, 0, b"lib".to_vec());

    let a = deploy_with_library(&harness, "A", &release).unwrap();
    let b = deploy_with_library(&harness, "B", &release).unwrap();

    let library = harness.package(&a).library_blob.unwrap();
    assert_eq!(harness.package(&b).library_blob, Some(library));
    assert_eq!(harness.repository.downloads(), 1);
}

#[test]
fn unchanged_shared_snapshot_library_is_not_a_conflict() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();

    let outcome = harness
        .manager
        .deploy(library_request("B", &library))
        .unwrap();

    assert_eq!(outcome.status, DeployStatus::Created);
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.warnings.is_empty());
    assert_eq!(
        harness.package(&outcome.package_id).library_blob,
        harness.package(&a).library_blob
    );
    assert_eq!(harness.repository.downloads(), 1);
}

#[test]
fn advanced_shared_snapshot_library_is_a_collision() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();

    harness.repository.publish(&library, 200, b"lib-v2".to_vec());
    let err = deploy_with_library(&harness, "B", &library).unwrap_err();
    let (same_origin, same_library) = err.conflicting_packages().unwrap();
    assert!(same_origin.is_empty());
    assert_eq!(same_library, &[a.clone()]);
    assert!(harness.manager.find_package_by_name("B").unwrap().is_none());

    let outcome = harness
        .manager
        .deploy(library_request("B", &library).with_allow_update_of_other_packages(true))
        .unwrap();
    assert_eq!(outcome.status, DeployStatus::Created);
    assert_eq!(outcome.conflicts.same_library, vec![a.clone()]);
    assert!(outcome.conflicts.same_origin.is_empty());
    assert_eq!(
        harness.package(&outcome.package_id).library_blob,
        harness.package(&a).library_blob
    );
}

#[test]
fn refreshed_library_redeploys_linked_packages() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();
    let a_file = harness.manager.owned_entities(&a).unwrap().keywords[0].file.clone();

    harness.repository.publish(&library, 200, b"lib-v2".to_vec());
    let b = deploy_with_library_request(&harness, "B", &library, |request| {
        request.with_allow_update_of_other_packages(true)
    })
    .unwrap();

    let library_blob = harness.package(&b).library_blob.unwrap();
    assert_eq!(harness.blobs.content(&library_blob).unwrap().unwrap(), b"lib-v2");
    // The redeploy of A re-staged its keyword file.
    let redeployed = harness.manager.owned_entities(&a).unwrap();
    assert_eq!(redeployed.keywords.len(), 1);
    assert_ne!(redeployed.keywords[0].file, a_file);
    assert_eq!(harness.package(&a).library_blob, Some(library_blob));
    assert!(harness.package(&a).is_live());
}

#[test]
fn refresh_can_be_disabled_per_request() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();

    harness.repository.publish(&library, 200, b"lib-v2".to_vec());
    let outcome = harness
        .manager
        .deploy(library_request("A", &library).with_refresh_snapshots(false))
        .unwrap();

    assert_eq!(outcome.status, DeployStatus::Updated);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("mvn:org.acme:lib:1.0-SNAPSHOT"));
    let blob_id = harness.package(&a).library_blob.unwrap();
    assert_eq!(harness.blobs.content(&blob_id).unwrap().unwrap(), b"lib-v1");
    assert_eq!(harness.blob(&blob_id).origin_timestamp, Some(100));
}

#[test]
fn refresh_disabled_deploys_the_stored_archive() {
    let harness = Harness::new();
    let origin = snapshot_package();
    harness
        .repository
        .publish(&origin, 100, sample_package("P", b"v1"));
    let first = harness
        .manager
        .deploy(DeployRequest::create(PackageSource::remote(origin.clone())))
        .unwrap();
    let blob_id = harness.package(&first.package_id).archive_blob.unwrap();

    harness
        .repository
        .publish(&origin, 200, sample_package("P", b"v2"));
    let second = harness
        .manager
        .deploy(DeployRequest::update(PackageSource::remote(origin.clone())).with_refresh_snapshots(false))
        .unwrap();

    assert_eq!(second.warnings.len(), 1);
    // Entities still match the archive blob they link to.
    assert_eq!(keyword_body(&harness, &first.package_id), b"v1");
    assert_eq!(harness.package(&first.package_id).archive_blob, Some(blob_id.clone()));
    assert_eq!(harness.blob(&blob_id).origin_timestamp, Some(100));

    // Once refresh is allowed again the newer snapshot lands.
    let third = harness
        .manager
        .deploy(DeployRequest::update(PackageSource::remote(origin)))
        .unwrap();
    assert!(third.warnings.is_empty());
    assert_eq!(keyword_body(&harness, &first.package_id), b"v2");
    assert_eq!(harness.blob(&blob_id).origin_timestamp, Some(200));
}

#[test]
fn lost_content_is_downloaded_again() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();
    let blob_id = harness.package(&a).library_blob.unwrap();
    assert!(harness.blobs.discard_content(&blob_id));

    deploy_with_library_request(&harness, "A", &library, |request| {
        request.with_refresh_snapshots(false)
    })
    .unwrap();

    assert_eq!(harness.package(&a).library_blob, Some(blob_id.clone()));
    assert_eq!(harness.blobs.content(&blob_id).unwrap().unwrap(), b"lib-v1");
    assert_eq!(harness.repository.downloads(), 2);
}

#[test]
fn blob_reuse_can_be_refused() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    deploy_with_library(&harness, "A", &library).unwrap();

    let err = deploy_with_library_request(&harness, "A", &library, |request| {
        request.with_allow_blob_reuse(false)
    })
    .unwrap_err();

    assert!(matches!(err, DeployError::BlobReuseRejected { .. }));
}

#[test]
fn refresh_reports_up_to_date_snapshots() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();
    let blob_id = harness.package(&a).library_blob.unwrap();

    let outcome = harness.manager.refresh_blob(&blob_id).unwrap();

    assert_eq!(outcome.status, RefreshStatus::NotRequired);
    assert!(!outcome.is_failed());
    assert!(outcome.infos[0].contains("Refresh is not required"));
}

#[test]
fn refresh_rewrites_and_redeploys() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();
    let blob_id = harness.package(&a).library_blob.unwrap();
    let a_file = harness.manager.owned_entities(&a).unwrap().keywords[0].file.clone();

    harness.repository.publish(&library, 200, b"lib-v2".to_vec());
    let outcome = harness.manager.refresh_blob(&blob_id).unwrap();

    assert_eq!(outcome.status, RefreshStatus::Refreshed);
    assert!(!outcome.is_failed(), "{:?}", outcome.errors);
    assert!(outcome.infos.iter().any(|info| info.contains("redeployed")));
    assert_eq!(harness.blobs.content(&blob_id).unwrap().unwrap(), b"lib-v2");
    assert_ne!(harness.manager.owned_entities(&a).unwrap().keywords[0].file, a_file);
}

#[test]
fn refresh_rejects_blobs_without_remote_origin() {
    let harness = Harness::new();
    let outcome = harness
        .manager
        .deploy(DeployRequest::create(PackageSource::upload(
            "p.zip",
            plan_only_package("P", "Pl1"),
        )))
        .unwrap();
    let archive = harness.package(&outcome.package_id).archive_blob.unwrap();

    let refresh = harness.manager.refresh_blob(&archive).unwrap();
    assert!(refresh.is_failed());
    assert_eq!(refresh.status, RefreshStatus::NotRequired);

    let err = harness.manager.refresh_blob(&"missing".into()).unwrap_err();
    assert!(matches!(err, DeployError::BlobNotFound(_)));
}

#[test]
fn linked_blobs_cannot_be_deleted() {
    let harness = Harness::new();
    let library = snapshot_library();
    harness.repository.publish(&library, 100, b"lib-v1".to_vec());
    let a = deploy_with_library(&harness, "A", &library).unwrap();
    let blob_id = harness.package(&a).library_blob.unwrap();

    let err = harness.manager.delete_blob(&blob_id).unwrap_err();
    assert!(matches!(err, DeployError::BlobInUse { ref linked, .. } if linked == &[a.clone()]));

    let loose = harness
        .blobs
        .create(NewBlob::new(BlobType::PackageLibrary, "loose.jar", b"x".to_vec()))
        .unwrap();
    harness.manager.delete_blob(&loose.id).unwrap();
    assert!(harness.blobs.get(&loose.id).unwrap().is_none());
}

//! Deploy, download and delete through the `Depot` context.

use std::io::Read;
use std::sync::Arc;
use std::thread;

use depot_sdk::{BinaryStoreConfig, Depot, ProviderKind, RepoPath, SdkError};
use tempfile::TempDir;

fn path(p: &str) -> RepoPath {
    RepoPath::parse(p).unwrap()
}

fn download(depot: &Depot, p: &str) -> Vec<u8> {
    let (_, mut stream) = depot.download(&path(p)).unwrap().unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    buf
}

#[test]
fn deploy_and_download_on_disk() {
    let dir = TempDir::new().unwrap();
    let mut config = BinaryStoreConfig::with_base_dir(dir.path());
    config.chain.template = Some("filesystem-cache".into());
    let depot = Depot::open(&config).unwrap();
    assert_eq!(depot.binaries().chain()[1], ProviderKind::CacheFs);

    depot
        .deploy(&path("libs-release:org/acme/acme-1.0.jar"), &b"v1"[..], "alice")
        .unwrap();
    assert_eq!(download(&depot, "libs-release:org/acme/acme-1.0.jar"), b"v1");

    let redeployed = depot
        .deploy(&path("libs-release:org/acme/acme-1.0.jar"), &b"v2"[..], "bob")
        .unwrap();
    assert_eq!(redeployed.created_by, "alice");
    assert_eq!(redeployed.modified_by, "bob");
    assert_eq!(download(&depot, "libs-release:org/acme/acme-1.0.jar"), b"v2");
}

#[test]
fn same_content_at_two_paths_is_stored_once() {
    let depot = Depot::in_memory().unwrap();
    let a = depot.deploy(&path("libs:a/x.bin"), &b"shared"[..], "alice").unwrap();
    let b = depot.deploy(&path("libs:b/x.bin"), &b"shared"[..], "alice").unwrap();
    assert_eq!(a.sha1(), b.sha1());

    let sha1 = *a.sha1().unwrap();
    assert_eq!(depot.binaries().usage(&sha1).unwrap().writes, 1);

    assert!(depot.delete(&path("libs:a")).unwrap());
    assert_eq!(download(&depot, "libs:b/x.bin"), b"shared");
}

#[test]
fn concurrent_deploys_into_one_folder() {
    let depot = Arc::new(Depot::in_memory().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let depot = Arc::clone(&depot);
            thread::spawn(move || {
                let p = path(&format!("libs:org/acme/artifact-{i}.jar"));
                depot
                    .deploy(&p, format!("artifact {i}").as_bytes(), &format!("user-{i}"))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let folder = depot.items().load(&path("libs:org/acme")).unwrap().unwrap();
    let children = folder.children().unwrap();
    assert_eq!(children.len(), 8);
    for i in 0..8 {
        assert!(children.contains(&format!("artifact-{i}.jar")));
        assert_eq!(
            download(&depot, &format!("libs:org/acme/artifact-{i}.jar")),
            format!("artifact {i}").into_bytes()
        );
    }
    assert!(depot.registry().is_empty());
}

#[test]
fn deploy_to_repository_root_is_rejected() {
    let depot = Depot::in_memory().unwrap();
    assert!(matches!(
        depot.deploy(&path("libs:"), &b"x"[..], "alice"),
        Err(SdkError::NotAFile(_))
    ));
}

#[test]
fn delete_of_missing_path_changes_nothing() {
    let depot = Depot::in_memory().unwrap();
    depot.deploy(&path("libs:org/a.jar"), &b"a"[..], "alice").unwrap();
    let before = depot.items().load(&path("libs:org")).unwrap().unwrap();

    assert!(!depot.delete(&path("libs:org/missing.jar")).unwrap());
    assert!(!depot.delete(&path("other:anything")).unwrap());

    let after = depot.items().load(&path("libs:org")).unwrap().unwrap();
    assert!(after.ptr_eq(&before));
    assert!(depot.items().load(&path("other:")).unwrap().is_none());
    assert!(depot.registry().is_empty());
}

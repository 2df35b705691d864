//! Randomized escape attempts against the path resolver.

use std::fs;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use rax_browse_server::error::ServeError;
use rax_browse_server::storage::ServerRoot;

const PIECES: &[&str] = &[
    "..", ".", "%2e%2e", "%2E%2e", ".%2e", "%2e.", "a", "b", "dir", "rootEVIL", "secret.txt",
    "file.txt", "up", "%2f", "%2F", "\\", "..\\..", "~", "%00", "%ff", "%c0%ae", "a%20b", "",
];

fn random_path(rng: &mut StdRng) -> String {
    let mut path = String::new();
    if rng.gen_bool(0.8) {
        path.push('/');
    }
    for _ in 0..rng.gen_range(1..10) {
        path.push_str(PIECES.choose(rng).copied().unwrap_or(".."));
        if rng.gen_bool(0.85) {
            path.push('/');
        }
    }
    path
}

#[test]
fn test_random_paths_stay_inside_root() {
    let parent = TempDir::new().unwrap();
    let root_dir = parent.path().join("root");
    fs::create_dir_all(root_dir.join("dir/a/b")).unwrap();
    fs::create_dir_all(parent.path().join("rootEVIL")).unwrap();
    fs::write(root_dir.join("dir/a/file.txt"), b"inside").unwrap();
    fs::write(parent.path().join("secret.txt"), b"outside").unwrap();
    fs::write(parent.path().join("rootEVIL/secret.txt"), b"outside").unwrap();

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(parent.path(), root_dir.join("dir/up")).unwrap();
        std::os::unix::fs::symlink("a", root_dir.join("dir/b")).unwrap();
    }

    let root = ServerRoot::new(&root_dir).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let mut resolved = 0;

    for _ in 0..5000 {
        let path = random_path(&mut rng);
        match root.resolve(&path) {
            Ok(found) => {
                resolved += 1;
                assert!(
                    found.real_path.starts_with(root.path()),
                    "{path:?} escaped to {}",
                    found.real_path.display()
                );
                assert!(found.virtual_path.starts_with('/'));
                assert!(!found.virtual_path.split('/').any(|s| s == ".."));
            }
            Err(
                ServeError::Forbidden(_)
                | ServeError::NotFound(_)
                | ServeError::InvalidInput(_)
                | ServeError::PermissionDenied(_),
            ) => {}
            Err(other) => panic!("{path:?} failed unexpectedly: {other}"),
        }
    }

    // Sanity check that the generator reaches real targets too
    assert!(resolved > 0);
}

#[test]
fn test_known_escape_forms_are_rejected() {
    let parent = TempDir::new().unwrap();
    let root_dir = parent.path().join("root");
    fs::create_dir(&root_dir).unwrap();
    fs::write(parent.path().join("secret.txt"), b"outside").unwrap();
    let root = ServerRoot::new(&root_dir).unwrap();

    for path in [
        "/../secret.txt",
        "../secret.txt",
        "/%2e%2e/secret.txt",
        "/%2E%2E%2Fsecret.txt",
        "/./../secret.txt",
        "/a/../../secret.txt",
        "//../secret.txt",
    ] {
        assert!(
            matches!(root.resolve(path), Err(ServeError::Forbidden(_))),
            "{path} was not forbidden"
        );
    }
}

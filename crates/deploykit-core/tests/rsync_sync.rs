//! Integration tests for rsync transfer against local directories.
//!
//! All tests no-op when the system has no rsync binary.

use std::collections::BTreeSet;
use std::path::Path;

use deploykit_core::{is_rsync_available, Session, SyncOptions, TargetSpec};

fn walk(root: &Path) -> BTreeSet<String> {
    let mut entries = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            entries.insert(
                path.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned(),
            );
            if path.is_dir() {
                stack.push(path);
            }
        }
    }
    entries
}

fn seed(dir: &Path, files: &[&str]) {
    for file in files {
        let path = dir.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("content of {file}")).unwrap();
    }
}

#[tokio::test]
async fn upload_merges_trees_and_delete_prunes() {
    if !is_rsync_available() {
        eprintln!("rsync not installed, skipping");
        return;
    }

    let source_root = tempfile::tempdir().unwrap();
    let target_root = tempfile::tempdir().unwrap();
    let mut session = Session::local();

    // first tree
    let src1 = source_root.path().join("data1");
    seed(&src1, &["dir/file1.txt"]);
    let res = session
        .upload(
            src1.join("dir").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions::default(),
        )
        .await
        .expect("upload failed");
    assert!(res.passed());
    assert_eq!(
        walk(target_root.path()),
        ["dir", "dir/file1.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    );

    // second tree merges into the first
    let src2 = source_root.path().join("data2");
    seed(&src2, &["dir/file2.txt", "dir/subdir/file3.txt"]);
    session
        .upload(
            src2.join("dir").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions::default(),
        )
        .await
        .expect("upload failed");
    assert_eq!(
        walk(target_root.path()),
        [
            "dir",
            "dir/file1.txt",
            "dir/file2.txt",
            "dir/subdir",
            "dir/subdir/file3.txt"
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    );

    // a third tree with --delete replaces everything under dir/
    let src3 = source_root.path().join("data3");
    seed(&src3, &["dir/file1.txt", "dir/file4.txt"]);
    session
        .upload(
            src3.join("dir").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions {
                delete: true,
                ..SyncOptions::default()
            },
        )
        .await
        .expect("upload failed");
    assert_eq!(
        walk(target_root.path()),
        ["dir", "dir/file1.txt", "dir/file4.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    );
}

#[tokio::test]
async fn download_copies_from_the_target_side() {
    if !is_rsync_available() {
        eprintln!("rsync not installed, skipping");
        return;
    }

    let source_root = tempfile::tempdir().unwrap();
    let dest_root = tempfile::tempdir().unwrap();
    seed(source_root.path(), &["logs/app.log"]);
    let mut session = Session::local();

    // on a local session download is a plain local copy
    session
        .download(
            source_root.path().join("logs").to_str().unwrap(),
            dest_root.path().to_str().unwrap(),
            &SyncOptions::default(),
        )
        .await
        .expect("download failed");

    assert!(dest_root.path().join("logs/app.log").is_file());
}

#[tokio::test]
async fn filters_exclude_paths() {
    if !is_rsync_available() {
        eprintln!("rsync not installed, skipping");
        return;
    }

    let source_root = tempfile::tempdir().unwrap();
    let target_root = tempfile::tempdir().unwrap();
    seed(
        source_root.path(),
        &["app/main.py", "app/.git/HEAD", "app/__pycache__/main.pyc"],
    );
    let mut session = Session::local();

    session
        .upload(
            source_root.path().join("app").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions {
                filters: vec![
                    "--exclude=.git/".to_string(),
                    "--exclude=__pycache__/".to_string(),
                ],
                ..SyncOptions::default()
            },
        )
        .await
        .expect("upload failed");

    let entries = walk(target_root.path());
    assert!(entries.contains("app/main.py"));
    assert!(!entries.iter().any(|e| e.contains(".git")));
    assert!(!entries.iter().any(|e| e.contains("__pycache__")));
}

#[tokio::test]
async fn mismatched_spec_skips_the_transfer() {
    // no rsync needed: the transfer is omitted before the binary runs
    let source_root = tempfile::tempdir().unwrap();
    let target_root = tempfile::tempdir().unwrap();
    seed(source_root.path(), &["dir/file1.txt"]);
    let mut session = Session::local();

    let res = session
        .upload(
            source_root.path().join("dir").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions {
                target_spec: TargetSpec::Remote,
                ..SyncOptions::default()
            },
        )
        .await
        .expect("upload failed");

    assert!(res.omitted);
    assert!(walk(target_root.path()).is_empty());
}

#[tokio::test]
async fn dry_run_reports_without_copying() {
    let source_root = tempfile::tempdir().unwrap();
    let target_root = tempfile::tempdir().unwrap();
    seed(source_root.path(), &["dir/file1.txt"]);
    let mut session = Session::local();

    session
        .upload(
            source_root.path().join("dir").to_str().unwrap(),
            target_root.path().to_str().unwrap(),
            &SyncOptions {
                dry_run: true,
                ..SyncOptions::default()
            },
        )
        .await
        .expect("upload failed");

    assert!(walk(target_root.path()).is_empty());
}

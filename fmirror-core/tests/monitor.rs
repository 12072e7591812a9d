use anyhow::Result;
use fmirror_core::testutils::MemoryRemote;
use fmirror_core::{Config, MappingConfig, Pattern, Plan, TaskState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config(root: &Path, threshold: u32) -> Config {
    Config {
        remote_host: "memory".into(),
        remote_username: "tester".into(),
        remote_password: String::new(),
        local_root_path: root.to_path_buf(),
        remote_root_path: "/srv".into(),
        ignore_patterns: vec![Pattern("*.swp".into())],
        path_mappings: vec![MappingConfig {
            local: "site".into(),
            remote: "www".into(),
        }],
        identity_file: None,
        host_fingerprints: None,
        max_consecutive_failures: threshold,
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn mirrors_local_changes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let site = root.join("site");
    std::fs::create_dir_all(site.join("sub"))?;

    let remote = Arc::new(MemoryRemote::new());
    let handle = Plan::from_config(&config(&root, 0))?.start(remote.clone())?;
    assert_eq!(handle.state(), TaskState::Running);

    std::fs::write(site.join("sub/a.txt"), "alpha")?;
    eventually("upload", || {
        remote.file("/srv/www/sub/a.txt").as_deref() == Some(&b"alpha"[..])
    })
    .await;

    std::fs::write(site.join(".a.txt.swp"), "junk")?;
    std::fs::rename(site.join("sub/a.txt"), site.join("b.txt"))?;
    eventually("move", || {
        remote.file("/srv/www/b.txt").is_some() && remote.file("/srv/www/sub/a.txt").is_none()
    })
    .await;

    std::fs::remove_file(site.join("b.txt"))?;
    eventually("delete", || remote.file("/srv/www/b.txt").is_none()).await;

    assert!(remote.files().keys().all(|p| !p.ends_with(".swp")));
    assert_eq!(handle.stop().await, TaskState::Idle);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn keeps_going_after_a_failure() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let site = root.join("site");
    std::fs::create_dir_all(&site)?;

    let remote = Arc::new(MemoryRemote::new());
    remote.fail_on(Some("broken.txt"));
    let handle = Plan::from_config(&config(&root, 0))?.start(remote.clone())?;

    std::fs::write(site.join("broken.txt"), "x")?;
    eventually("failed attempt", || {
        remote.ops().iter().any(|op| op.to_string().contains("broken.txt"))
    })
    .await;
    std::fs::write(site.join("fine.txt"), "y")?;
    eventually("next upload", || remote.file("/srv/www/fine.txt").is_some()).await;

    assert_eq!(handle.state(), TaskState::Running);
    handle.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn gives_up_after_consecutive_failures_when_asked() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let site = root.join("site");
    std::fs::create_dir_all(&site)?;

    let remote = Arc::new(MemoryRemote::new());
    remote.fail_on(Some(""));
    let mut handle = Plan::from_config(&config(&root, 2))?.start(remote.clone())?;

    std::fs::write(site.join("one.txt"), "1")?;
    std::fs::write(site.join("two.txt"), "2")?;
    let reason = tokio::time::timeout(Duration::from_secs(5), handle.failed()).await?;
    assert!(reason.contains("2 consecutive"));
    assert!(matches!(handle.stop().await, TaskState::Error(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn moves_across_the_mapping_boundary() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let site = root.join("site");
    let outside = root.join("outside");
    std::fs::create_dir_all(&site)?;
    std::fs::create_dir_all(outside.join("bundle/deep"))?;
    std::fs::write(outside.join("in.txt"), "incoming")?;
    std::fs::write(outside.join("bundle/deep/nested.txt"), "nested")?;

    let remote = Arc::new(MemoryRemote::new());
    let handle = Plan::from_config(&config(&root, 0))?.start(remote.clone())?;

    std::fs::write(site.join("keep.txt"), "keep")?;
    eventually("upload", || remote.file("/srv/www/keep.txt").is_some()).await;

    std::fs::rename(outside.join("in.txt"), site.join("in.txt"))?;
    std::fs::rename(outside.join("bundle"), site.join("bundle"))?;
    std::fs::rename(site.join("keep.txt"), outside.join("trashed.txt"))?;

    eventually("moved-in file", || {
        remote.file("/srv/www/in.txt").as_deref() == Some(&b"incoming"[..])
    })
    .await;
    eventually("moved-in directory", || {
        remote.file("/srv/www/bundle/deep/nested.txt").as_deref() == Some(&b"nested"[..])
    })
    .await;
    eventually("moved-out file", || remote.file("/srv/www/keep.txt").is_none()).await;

    assert_eq!(handle.stop().await, TaskState::Idle);
    Ok(())
}

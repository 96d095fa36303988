mod common;

use amfd::config::HaRole;
use amfd::core::errors::AmfError;
use amfd::core::imm::ccb::CcbOp;
use amfd::core::imm::store::ObjClass;
use amfd::core::logstream::{LogStreamService, StreamConfig};
use amfd::core::model::attr::{AttrValue, Attribute};
use common::{dn, spawn_test_director, test_config};

fn stream_cfg(name: &str) -> StreamConfig {
    StreamConfig {
        name: name.to_string(),
        file_name: "saLogApplication".to_string(),
        rel_path: "app".to_string(),
        max_log_file_size: 4096,
        fixed_log_record_size: 0,
        max_files_rotated: 2,
        severity_filter: 0x7f,
    }
}

#[test]
fn test_write_rotate_and_prune() {
    let tmp = tempfile::tempdir().unwrap();
    let mut svc = LogStreamService::new(tmp.path());
    let mut cfg = stream_cfg("safLgStrCfg=app");
    cfg.max_log_file_size = 256;
    svc.open(cfg).unwrap();

    for i in 0..64 {
        svc.write("safLgStrCfg=app", 1, &format!("record number {i}"))
            .unwrap();
    }
    let dir = tmp.path().join("app");
    let rotated = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("saLogApplication_"))
        .count();
    assert!(rotated >= 1, "writes past the size limit rotate the file");
    assert!(rotated <= 2, "rotations past the limit are pruned");
    assert!(dir.join("saLogApplication.log").exists());
    assert!(dir.join("saLogApplication.cfg").exists());
}

#[test]
fn test_severity_filter_drops_records() {
    let tmp = tempfile::tempdir().unwrap();
    let mut svc = LogStreamService::new(tmp.path());
    let mut cfg = stream_cfg("safLgStrCfg=app");
    cfg.severity_filter = 0x01;
    svc.open(cfg).unwrap();

    svc.write("safLgStrCfg=app", 0x40, "filtered out").unwrap();
    svc.write("safLgStrCfg=app", 0x01, "kept").unwrap();
    let content =
        std::fs::read_to_string(tmp.path().join("app").join("saLogApplication.log")).unwrap();
    assert!(content.contains("kept"));
    assert!(!content.contains("filtered out"));

    svc.change_filter("safLgStrCfg=app", 0x7f).unwrap();
    svc.write("safLgStrCfg=app", 0x40, "now visible").unwrap();
    let content =
        std::fs::read_to_string(tmp.path().join("app").join("saLogApplication.log")).unwrap();
    assert!(content.contains("now visible"));
}

#[test]
fn test_oversized_stream_name_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut svc = LogStreamService::new(tmp.path());
    let cfg = stream_cfg(&"x".repeat(300));
    assert!(matches!(svc.open(cfg), Err(AmfError::InvalidParam(_))));
}

#[tokio::test]
async fn test_log_root_rename_moves_streams() {
    let old_root = tempfile::tempdir().unwrap();
    let new_root = tempfile::tempdir().unwrap();
    let config = test_config(
        "safAmfNode=SC-1,safAmfCluster=myAmfCluster",
        HaRole::Active,
        old_root.path(),
    );
    let td = spawn_test_director(config).await;

    let u = |n: &str, v: u32| Attribute::single(n, AttrValue::Uint32(v));
    let s = |n: &str, v: &str| Attribute::single(n, AttrValue::Str(v.to_string()));

    td.handle
        .ccb(vec![
            CcbOp::create(
                ObjClass::LogConfig,
                dn("logConfig=1"),
                vec![u("logMaxApplicationStreams", 8)],
            ),
            CcbOp::create(
                ObjClass::LogStream,
                dn("safLgStrCfg=app"),
                vec![
                    s("saLogStreamFileName", "app"),
                    s("saLogStreamPathName", "streams"),
                    u("saLogStreamMaxFilesRotated", 3),
                ],
            ),
        ])
        .await
        .unwrap();

    td.handle
        .log_write("safLgStrCfg=app", 1, "before the move")
        .await
        .unwrap();
    assert!(old_root.path().join("streams").join("app.log").exists());

    // Renaming the root closes, seals, and recreates every stream file.
    td.handle
        .ccb(vec![CcbOp::modify(
            ObjClass::LogConfig,
            dn("logConfig=1"),
            vec![s("logRootDirectory", &new_root.path().display().to_string())],
        )])
        .await
        .unwrap();

    td.handle
        .log_write("safLgStrCfg=app", 1, "after the move")
        .await
        .unwrap();
    let moved = new_root.path().join("streams").join("app.log");
    assert!(moved.exists(), "subsequent writes land under the new root");
    let content = std::fs::read_to_string(&moved).unwrap();
    assert!(content.contains("after the move"));
    assert!(!content.contains("before the move"));

    // The old file was sealed with a timestamp suffix, not deleted.
    let sealed = std::fs::read_dir(old_root.path().join("streams"))
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("app_"));
    assert!(sealed);
}

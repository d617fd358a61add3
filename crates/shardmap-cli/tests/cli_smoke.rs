use assert_cmd::Command;
use predicates::prelude::*;
use safetensors::tensor::{Dtype, TensorView};
use std::path::Path;

fn shardmap() -> Command {
    let mut cmd = Command::cargo_bin("shardmap").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("SHARDMAP_MAX_SPLIT_LEN")
        .env_remove("SHARDMAP_REBASE_POLICY")
        .env_remove("SHARDMAP_INDEX_FILE");
    cmd
}

fn write_model(dir: &Path) {
    let embed: Vec<u8> = (0..8).flat_map(|i| (i as f32).to_le_bytes()).collect();
    let norm: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let views = [
        ("embed", TensorView::new(Dtype::F32, vec![2, 4], &embed).unwrap()),
        ("norm", TensorView::new(Dtype::F32, vec![2], &norm).unwrap()),
    ];
    let bytes = safetensors::serialize(views.iter().map(|(k, v)| (*k, v)), None).unwrap();
    std::fs::write(dir.join("model-00001-of-00001.safetensors"), bytes).unwrap();
    std::fs::write(
        dir.join("model.safetensors.index.json"),
        r#"{"metadata": {"total_size": 40}, "weight_map": {
            "embed": "model-00001-of-00001.safetensors",
            "norm": "model-00001-of-00001.safetensors"}}"#,
    )
    .unwrap();
}

#[test]
fn help_works() {
    shardmap().arg("--help").assert().success();
}

#[test]
fn version_works() {
    shardmap().arg("--version").assert().success();
}

#[test]
fn help_mentions_core_subcommands() {
    let out = shardmap().arg("--help").assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    for needle in ["inspect", "plan", "lookup", "--max-split-len", "--config"] {
        assert!(s.contains(needle), "help missing `{needle}`");
    }
}

#[test]
fn invalid_command_fails() {
    shardmap().arg("nonexistent-command").assert().failure();
}

#[test]
fn inspect_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    shardmap()
        .arg("inspect")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Tensors:  2"))
        .stdout(predicate::str::contains("model-00001-of-00001.safetensors"));
}

#[test]
fn lookup_json_reports_values() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let out = shardmap()
        .args(["lookup", "--json", "--values", "3"])
        .arg(dir.path())
        .arg("embed")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["dtype"], "F32");
    assert_eq!(report["shape"], serde_json::json!([2, 4]));
    assert_eq!(report["values"], serde_json::json!([0.0, 1.0, 2.0]));
}

#[test]
fn lookup_unknown_tensor_exits_with_code_4() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    shardmap()
        .arg("lookup")
        .arg(dir.path())
        .arg("missing.weight")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Unknown tensor: missing.weight"));
}

#[test]
fn plan_with_small_ceiling_shows_splits() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    let out = shardmap()
        .args(["plan", "--json", "--max-split-len", "32"])
        .arg(dir.path().join("model-00001-of-00001.safetensors"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["max_split_len"], 32);
    assert_eq!(report["splits"].as_array().unwrap().len(), 2);
}

#[test]
fn plan_rejects_oversized_tensor() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    shardmap()
        .args(["plan", "--max-split-len", "16"])
        .arg(dir.path().join("model-00001-of-00001.safetensors"))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Tensor too large to map"));
}

#[test]
fn missing_model_exits_with_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    shardmap().arg("inspect").arg(dir.path()).assert().code(3);
}

#[test]
fn invalid_max_split_len_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    shardmap()
        .args(["inspect", "--max-split-len", "0"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("max_split_len"));
}

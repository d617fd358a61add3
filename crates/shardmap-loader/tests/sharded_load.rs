//! End-to-end loading of sharded models written by the `safetensors` crate.

use safetensors::tensor::{Dtype, TensorView};
use shardmap_common::{LoadConfig, RebasePolicy, ShardMapError};
use shardmap_loader::{ShardIndex, load};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Tensor {
    name: &'static str,
    dtype: Dtype,
    shape: Vec<usize>,
    data: Vec<u8>,
}

fn f32_tensor(name: &'static str, values: &[f32]) -> Tensor {
    Tensor {
        name,
        dtype: Dtype::F32,
        shape: vec![values.len()],
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn ramp(start: f32, n: usize) -> Vec<f32> {
    (0..n).map(|i| start + i as f32).collect()
}

fn write_shard(dir: &Path, file: &str, tensors: &[Tensor]) {
    let views: Vec<(&str, TensorView<'_>)> = tensors
        .iter()
        .map(|t| (t.name, TensorView::new(t.dtype, t.shape.clone(), &t.data).unwrap()))
        .collect();
    let meta = HashMap::from([("format".to_string(), "pt".to_string())]);
    let bytes = safetensors::serialize(views.iter().map(|(k, v)| (*k, v)), Some(meta)).unwrap();
    std::fs::write(dir.join(file), bytes).unwrap();
}

fn write_index(dir: &Path, file: &str, weight_map: &[(&str, &str)]) {
    let map: serde_json::Map<String, serde_json::Value> =
        weight_map.iter().map(|(k, v)| (k.to_string(), serde_json::Value::from(*v))).collect();
    let doc = serde_json::json!({ "metadata": { "total_size": 0 }, "weight_map": map });
    std::fs::write(dir.join(file), serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}

const SHARD_1: &str = "model-00001-of-00002.safetensors";
const SHARD_2: &str = "model-00002-of-00002.safetensors";
const INDEX: &str = "model.safetensors.index.json";

/// Two shards, three tensors in the first and two in the second.
fn two_shard_model() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_shard(
        dir.path(),
        SHARD_1,
        &[
            f32_tensor("model.embed_tokens.weight", &ramp(0.0, 12)),
            f32_tensor("model.layers.0.attn.weight", &ramp(100.0, 12)),
            f32_tensor("model.layers.0.mlp.weight", &ramp(200.0, 12)),
        ],
    );
    write_shard(
        dir.path(),
        SHARD_2,
        &[
            f32_tensor("model.norm.weight", &ramp(300.0, 4)),
            f32_tensor("lm_head.weight", &ramp(400.0, 12)),
        ],
    );
    write_index(
        dir.path(),
        INDEX,
        &[
            ("model.embed_tokens.weight", SHARD_1),
            ("model.layers.0.attn.weight", SHARD_1),
            ("model.layers.0.mlp.weight", SHARD_1),
            ("model.norm.weight", SHARD_2),
            ("lm_head.weight", SHARD_2),
        ],
    );
    dir
}

// ---------------------------------------------------------------------------
// Load and lookup
// ---------------------------------------------------------------------------

#[test]
fn loads_two_shard_model() {
    let dir = two_shard_model();
    let index = load(dir.path()).unwrap();

    assert!(index.is_loaded());
    assert_eq!(index.shard_files(), [SHARD_1, SHARD_2]);
    assert_eq!(index.tensor_count(), 5);
    assert_eq!(index.region_count(), 2);
    assert_eq!(index.metadata().get("total_size"), Some(&serde_json::json!(0)));

    let view = index.lookup("model.layers.0.attn.weight").unwrap();
    assert_eq!(view.name(), "model.layers.0.attn.weight");
    assert_eq!(view.shape(), &[12]);
    assert_eq!(view.len(), 48);
    assert_eq!(view.to_f32_vec().unwrap(), ramp(100.0, 12));

    let head = index.lookup("lm_head.weight").unwrap();
    assert_eq!(head.to_f32_vec().unwrap(), ramp(400.0, 12));

    let (file, location) = index.tensor_info("model.norm.weight").unwrap();
    assert_eq!(file, SHARD_2);
    assert_eq!(location.shape, vec![4]);
    assert_eq!(index.region_map(SHARD_2).unwrap().metadata().get("format").unwrap(), "pt");
}

#[test]
fn unknown_tensor_is_a_local_error() {
    let dir = two_shard_model();
    let index = load(dir.path()).unwrap();
    let err = index.lookup("model.layers.99.weight").unwrap_err();
    assert!(matches!(
        err,
        ShardMapError::UnknownTensor { ref name } if name == "model.layers.99.weight"
    ));
    // The index stays usable.
    assert!(index.lookup("model.norm.weight").is_ok());
}

#[test]
fn small_ceiling_maps_one_region_per_tensor() {
    let dir = two_shard_model();
    let config = LoadConfig::default().with_max_split_len(48);
    let index = ShardIndex::open(dir.path(), config).unwrap();

    // 48-byte tensors each get their own region; the 16-byte norm shares one.
    assert!(index.region_count() >= 4);
    for summary in index.split_summaries() {
        assert!(summary.mapped_bytes <= 48, "{summary:?}");
    }
    for name in ["model.embed_tokens.weight", "model.layers.0.mlp.weight", "lm_head.weight"] {
        let (region, location) = index.resolve(name).unwrap();
        assert_eq!(location.offsets.len(), 48);
        assert_eq!(region.len(), 48, "{name} should fill its region");
    }
    let mlp = index.lookup("model.layers.0.mlp.weight").unwrap();
    assert_eq!(mlp.to_f32_vec().unwrap(), ramp(200.0, 12));
}

#[test]
fn oversized_tensor_aborts_load() {
    let dir = two_shard_model();
    let config = LoadConfig::default().with_max_split_len(32);
    let err = ShardIndex::open(dir.path(), config).unwrap_err();
    assert!(matches!(err, ShardMapError::TensorSpanTooLarge { limit: 32, .. }));
}

#[test]
fn parallel_load_matches_sequential() {
    let dir = two_shard_model();
    let sequential =
        ShardIndex::open(dir.path(), LoadConfig::default().with_max_split_len(64)).unwrap();
    let parallel = ShardIndex::open(
        dir.path(),
        LoadConfig::default().with_max_split_len(64).with_parallel(true),
    )
    .unwrap();

    assert_eq!(sequential.split_summaries(), parallel.split_summaries());
    let names: Vec<_> = sequential.tensor_names().collect();
    assert_eq!(names, parallel.tensor_names().collect::<Vec<_>>());
    for name in names {
        assert_eq!(
            sequential.lookup(name).unwrap().bytes(),
            parallel.lookup(name).unwrap().bytes()
        );
    }
}

#[test]
fn split_start_policy_loads_packed_files_identically() {
    let dir = two_shard_model();
    let strict =
        ShardIndex::open(dir.path(), LoadConfig::default().with_max_split_len(64)).unwrap();
    let start = ShardIndex::open(
        dir.path(),
        LoadConfig::default().with_max_split_len(64).with_rebase_policy(RebasePolicy::SplitStart),
    )
    .unwrap();
    assert_eq!(strict.split_summaries(), start.split_summaries());
}

// ---------------------------------------------------------------------------
// Failure modes and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn missing_shard_fails_and_closes() {
    let dir = two_shard_model();
    std::fs::remove_file(dir.path().join(SHARD_2)).unwrap();
    let document = shardmap_format::IndexDocument::from_path(&dir.path().join(INDEX)).unwrap();
    let mut index = ShardIndex::new(document);

    let err = index.load(dir.path()).unwrap_err();
    match &err {
        ShardMapError::FileNotFound { path, .. } => assert!(path.ends_with(SHARD_2)),
        other => panic!("expected FileNotFound, got {other:?}"),
    }
    assert!(!index.is_loaded());
    assert_eq!(index.region_count(), 0);
    assert!(index.lookup("model.embed_tokens.weight").is_err());
}

#[test]
fn missing_index_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(load(dir.path()), Err(ShardMapError::FileNotFound { .. })));
}

#[test]
fn malformed_index_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(INDEX), br#"{"metadata": {}}"#).unwrap();
    assert!(matches!(load(dir.path()), Err(ShardMapError::Index(_))));
}

#[test]
fn corrupt_shard_header_is_malformed() {
    let dir = two_shard_model();
    std::fs::write(dir.path().join(SHARD_2), b"\x10\0\0\0\0\0\0\0not json at all!").unwrap();
    assert!(matches!(load(dir.path()), Err(ShardMapError::MalformedHeader { .. })));
}

#[test]
fn close_is_idempotent() {
    let dir = two_shard_model();
    let mut index = load(dir.path()).unwrap();
    index.close();
    index.close();
    assert!(!index.is_loaded());
    assert_eq!(index.tensor_count(), 0);
    assert!(matches!(index.lookup("lm_head.weight"), Err(ShardMapError::UnknownTensor { .. })));

    // Reloading after close works.
    index.load(dir.path()).unwrap();
    assert!(index.lookup("lm_head.weight").is_ok());
}

#[test]
fn loading_twice_reprocesses_nothing() {
    let dir = two_shard_model();
    let mut index = ShardIndex::open(dir.path(), LoadConfig::default().with_max_split_len(48))
        .unwrap();
    let summaries = index.split_summaries();
    let before = index.lookup("lm_head.weight").unwrap().bytes().to_vec();

    index.load(dir.path()).unwrap();
    assert_eq!(index.split_summaries(), summaries);
    assert_eq!(index.tensor_count(), 5);
    assert_eq!(index.lookup("lm_head.weight").unwrap().bytes(), before.as_slice());
    assert_eq!(index.root(), Some(dir.path()));
}

#[test]
fn loading_from_another_root_is_rejected() {
    let first = two_shard_model();
    let second = two_shard_model();
    let mut index = load(first.path()).unwrap();

    let err = index.load(second.path()).unwrap_err();
    assert!(matches!(err, ShardMapError::Config(_)));
    // The index keeps serving the first model.
    assert_eq!(index.root(), Some(first.path()));
    assert!(index.lookup("model.norm.weight").is_ok());

    index.close();
    index.load(second.path()).unwrap();
    assert_eq!(index.root(), Some(second.path()));
}

#[test]
fn minimal_header_probe_decodes_real_shards() {
    let dir = two_shard_model();
    let config = LoadConfig { header_probe_len: 8, ..LoadConfig::default() };
    let index = ShardIndex::open(dir.path(), config).unwrap();
    assert_eq!(index.tensor_count(), 5);
    assert_eq!(index.lookup("model.norm.weight").unwrap().to_f32_vec().unwrap(), ramp(300.0, 4));
}

#[test]
fn undersized_header_probe_is_a_config_error() {
    let dir = two_shard_model();
    let document = shardmap_format::IndexDocument::from_path(&dir.path().join(INDEX)).unwrap();
    let config = LoadConfig { header_probe_len: 4, ..LoadConfig::default() };
    let mut index = ShardIndex::with_config(document, config);
    assert!(matches!(index.load(dir.path()), Err(ShardMapError::Config(_))));
    assert!(!index.is_loaded());
}

#[test]
fn header_and_index_disagreement() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(
        dir.path(),
        SHARD_1,
        &[f32_tensor("present", &ramp(1.0, 2)), f32_tensor("unlisted", &ramp(5.0, 2))],
    );
    write_index(dir.path(), INDEX, &[("present", SHARD_1), ("ghost", SHARD_1)]);

    let index = load(dir.path()).unwrap();
    assert_eq!(index.lookup("present").unwrap().to_f32_vec().unwrap(), vec![1.0, 2.0]);
    // Only names the index presents are resolvable.
    assert!(matches!(index.lookup("unlisted"), Err(ShardMapError::UnknownTensor { .. })));
    assert!(matches!(index.lookup("ghost"), Err(ShardMapError::UnknownTensor { .. })));
    assert_eq!(index.tensor_names().collect::<Vec<_>>(), ["present"]);
    // The shard still maps the unlisted tensor.
    assert!(index.region_map(SHARD_1).unwrap().contains("unlisted"));
}

#[test]
fn custom_index_file_name() {
    let dir = tempfile::tempdir().unwrap();
    write_shard(dir.path(), "weights.safetensors", &[f32_tensor("w", &[1.0])]);
    write_index(dir.path(), "weights.index.json", &[("w", "weights.safetensors")]);

    let config = LoadConfig::default().with_index_file("weights.index.json");
    let index = ShardIndex::open(dir.path(), config).unwrap();
    assert_eq!(index.lookup("w").unwrap().to_f32_vec().unwrap(), vec![1.0]);
}

#[test]
fn empty_weight_map_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path(), INDEX, &[]);
    let index = load(dir.path()).unwrap();
    assert!(index.is_loaded());
    assert_eq!(index.tensor_count(), 0);
    assert_eq!(index.region_count(), 0);
}

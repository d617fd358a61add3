// Exit codes for scripted use
use shardmap_common::ShardMapError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_LOAD_FAIL: i32 = 3;
pub const EXIT_UNKNOWN_TENSOR: i32 = 4;
pub const EXIT_SPLIT_FAIL: i32 = 5;

/// Exit code for an error chain, keyed on the first [`ShardMapError`] in it.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(e) = err.chain().find_map(|e| e.downcast_ref::<ShardMapError>()) else {
        return EXIT_GENERIC_FAIL;
    };
    match e {
        ShardMapError::Config(_) => EXIT_CONFIG,
        ShardMapError::UnknownTensor { .. } | ShardMapError::Conversion { .. } => {
            EXIT_UNKNOWN_TENSOR
        }
        ShardMapError::TensorSpanTooLarge { .. } | ShardMapError::PackingViolation { .. } => {
            EXIT_SPLIT_FAIL
        }
        _ => EXIT_LOAD_FAIL,
    }
}

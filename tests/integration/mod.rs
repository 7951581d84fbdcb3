//! Integration tests for the Tessera compiler, runtime and stream decoder

mod actions_and_sync;
mod compile_tree;
mod config_loading;
mod flatten_roundtrip;
mod incremental_identity;
mod recursion_limits;
mod runtime_batching;
mod stream_decoding;
mod test_utils;

//! Environment source: `TESSERA_<SECTION>__<KEY>`, e.g. `TESSERA_COMPILER__MAX_DEPTH=64`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const PREFIX: &str = "TESSERA";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("compiler.known_types")
            .with_list_parse_key("compiler.sync_props"),
    )
}

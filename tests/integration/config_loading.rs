//! Integration tests for layered configuration loading

use std::sync::Mutex;
use tempfile::TempDir;
use tessera::config::{ConfigLoader, ENV_NAME_VAR};
use tessera::{Runtime, SchedulerKind, TesseraConfig};

/// Serializes tests that redirect XDG_CONFIG_HOME
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct IsolatedEnv {
    _temp: TempDir,
    workspace: std::path::PathBuf,
    previous: Vec<(&'static str, Option<String>)>,
}

impl IsolatedEnv {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config_home = temp.path().join("xdg");
        let workspace = temp.path().join("workspace");
        std::fs::create_dir_all(&config_home).unwrap();
        std::fs::create_dir_all(workspace.join("config")).unwrap();

        let keys = ["XDG_CONFIG_HOME", ENV_NAME_VAR, "TESSERA_STREAM__AUTO_REPAIR"];
        let previous = keys.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        std::env::set_var("XDG_CONFIG_HOME", &config_home);
        std::env::remove_var(ENV_NAME_VAR);
        std::env::remove_var("TESSERA_STREAM__AUTO_REPAIR");

        Self {
            _temp: temp,
            workspace,
            previous,
        }
    }

    fn write_workspace(&self, name: &str, body: &str) {
        std::fs::write(self.workspace.join("config").join(name), body).unwrap();
    }
}

impl Drop for IsolatedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[test]
fn test_workspace_file_configures_runtime() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env = IsolatedEnv::new();
    env.write_workspace(
        "config.toml",
        r#"
[compiler]
max_depth = 3
known_types = ["Page", "Box"]

[runtime]
scheduler = "manual"

[logging]
level = "debug"
"#,
    );

    let config = ConfigLoader::load(&env.workspace).unwrap();
    assert_eq!(config.compiler.max_depth, 3);
    assert_eq!(config.runtime.scheduler, SchedulerKind::Manual);
    assert_eq!(config.logging.level, "debug");

    let runtime = Runtime::new(&config);
    runtime.insert(tessera::Entity::new("root", "Page"));
    runtime.insert(tessera::Entity::new("mystery", "Widget").with_parent("root"));
    assert_eq!(runtime.generation(), 0);
    runtime.tick();

    let descriptors = runtime.descriptors();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].component_type, "Page");
    assert_eq!(descriptors[1].component_type, "Fragment");
}

#[test]
fn test_env_specific_file_and_variables_layer_on_top() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env = IsolatedEnv::new();
    env.write_workspace("config.toml", "[stream]\nauto_repair = true\n[compiler]\nmax_depth = 8\n");
    env.write_workspace("test.toml", "[compiler]\nmax_depth = 16\n");
    std::env::set_var(ENV_NAME_VAR, "test");
    std::env::set_var("TESSERA_STREAM__AUTO_REPAIR", "false");

    let config = ConfigLoader::load(&env.workspace).unwrap();
    assert_eq!(config.compiler.max_depth, 16);
    assert!(!config.stream.auto_repair);
}

#[test]
fn test_invalid_workspace_config_is_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env = IsolatedEnv::new();
    env.write_workspace("config.toml", "[logging]\nformat = \"xml\"\n");

    let err = ConfigLoader::load(&env.workspace).unwrap_err();
    assert!(err.to_string().contains("Invalid log format"));
}

#[test]
fn test_defaults_without_any_source() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env = IsolatedEnv::new();

    let config = ConfigLoader::load(&env.workspace).unwrap();
    assert_eq!(config, TesseraConfig::default());
}

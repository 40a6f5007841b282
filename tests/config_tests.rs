use std::collections::HashMap;

use guestmemo::config::{INITIAL_CAPACITY_ENV, MEMOIZE_ENV, SHARDS_ENV};
use guestmemo::{ConfigError, MemoConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn environment_overrides_defaults() {
    let mut config = MemoConfig::default();
    config
        .apply_env_with(lookup(&[
            (MEMOIZE_ENV, "false"),
            (INITIAL_CAPACITY_ENV, "4096"),
            (SHARDS_ENV, "16"),
        ]))
        .expect("valid overrides");

    assert!(!config.memoize);
    assert_eq!(config.cache.initial_capacity, 4096);
    assert_eq!(config.cache.shard_amount, Some(16));
    assert!(config.validate().is_ok());
}

#[test]
fn unset_variables_leave_values_alone() {
    let mut config = MemoConfig::default();
    config.apply_env_with(lookup(&[])).expect("nothing to apply");
    assert_eq!(config, MemoConfig::default());
}

#[test]
fn malformed_values_are_rejected() {
    let mut config = MemoConfig::default();
    let error = config
        .apply_env_with(lookup(&[(INITIAL_CAPACITY_ENV, "lots")]))
        .expect_err("not a number");
    assert!(matches!(
        error,
        ConfigError::InvalidValue { key, .. } if key == INITIAL_CAPACITY_ENV
    ));
}

#[test]
fn shard_amount_must_be_a_power_of_two() {
    for shards in [0, 1, 3, 12] {
        let mut config = MemoConfig::default();
        config
            .apply_env_with(lookup(&[(SHARDS_ENV, &shards.to_string())]))
            .expect("parses");
        assert!(config.validate().is_err(), "{shards} shards accepted");
    }
}

#[cfg(feature = "toml-config")]
mod toml_files {
    use std::fs;

    use super::*;

    #[test]
    fn file_values_fill_in_over_defaults() {
        let dir = tempfile::Builder::new()
            .prefix("guestmemo-config-test")
            .tempdir()
            .expect("failed to create temp dir");
        let path = dir.path().join("guestmemo.toml");
        fs::write(&path, "memoize = false\n\n[cache]\nshard_amount = 8\n").expect("write");

        let config = MemoConfig::from_toml_file(&path).expect("valid file");
        assert!(!config.memoize);
        assert_eq!(config.cache.shard_amount, Some(8));
        assert_eq!(config.cache.initial_capacity, 0);
    }

    #[test]
    fn broken_files_report_their_path() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "memoize = maybe").expect("write");

        let error = MemoConfig::from_toml_file(&path).expect_err("invalid toml");
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("broken.toml"));

        let missing = MemoConfig::from_toml_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}

#[cfg(not(feature = "toml-config"))]
#[test]
fn config_files_need_the_toml_feature() {
    let error = MemoConfig::load(Some(std::path::Path::new("guestmemo.toml")))
        .expect_err("feature disabled");
    assert!(matches!(error, ConfigError::TomlDisabled { .. }));
}

//! Tests for configuration loading

use cattle_harness::charts::InstallerOptions;
use cattle_harness::config::{Config, ConfigLoader, get_config_value, paths, set_config_value};

#[test]
fn test_config_file_layers_over_defaults() {
    let yaml = r#"
rancher:
  url: https://rancher.ci.internal
  tokenEnv: CI_RANCHER_TOKEN
install:
  watchTimeoutSeconds: 120
kube:
  context: ci
"#;
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, yaml).unwrap();

    let config = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(config.rancher.url, "https://rancher.ci.internal");
    assert_eq!(config.rancher.token_env, "CI_RANCHER_TOKEN");
    assert_eq!(config.rancher.request_timeout_seconds, 30);
    assert_eq!(config.install.watch_timeout_seconds, 120);
    assert_eq!(config.install.fleet_namespace, "fleet-default");
    assert_eq!(config.kube.context.as_deref(), Some("ci"));

    let options = InstallerOptions::from(&config.install);
    assert_eq!(options.watch_timeout_seconds, 120);
    assert_eq!(options.local_cluster, "local");
}

#[test]
fn test_invalid_yaml_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, "rancher: [unterminated").unwrap();

    let err = ConfigLoader::load_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_set_then_save_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");

    let mut config = Config::default();
    set_config_value(&mut config, "rancher.url", "https://rancher.example.com").unwrap();
    set_config_value(&mut config, "install.systemProject", "Platform").unwrap();
    ConfigLoader::save(&config, &path).unwrap();

    let loaded = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(
        get_config_value(&loaded, "rancher.url").unwrap(),
        "https://rancher.example.com"
    );
    assert_eq!(get_config_value(&loaded, "install.systemProject").unwrap(), "Platform");
}

#[test]
fn test_load_from_config_dir_with_env_overrides() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.yaml"),
        "rancher:\n  url: https://from-file.example.com\n",
    )
    .unwrap();

    // SAFETY: set_var is unsafe in Rust 2024 due to potential data races.
    // This is the only test in this binary touching these variables.
    unsafe {
        std::env::set_var("CATTLE_HARNESS_CONFIG_DIR", tmp.path());
        std::env::set_var("CATTLE_HARNESS_INSECURE", "true");
    }

    assert_eq!(paths::root_config_path(), tmp.path().join("config.yaml"));
    let config = ConfigLoader::load().unwrap();
    assert_eq!(config.rancher.url, "https://from-file.example.com");
    assert!(config.rancher.insecure);
    ConfigLoader::validate().unwrap();

    // SAFETY: see above.
    unsafe {
        std::env::remove_var("CATTLE_HARNESS_CONFIG_DIR");
        std::env::remove_var("CATTLE_HARNESS_INSECURE");
    }
}

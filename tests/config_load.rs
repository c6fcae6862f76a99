// tests/config_load.rs
use std::{env, fs};
use subscription_poller::config::{AppConfig, ConfigError, ENV_CONFIG_PATH};

const SAMPLE: &str = r#"
[logger]
level = "debug"
format = "json"

[storage]
path = "/var/lib/poller"

[poller]
concurrency = 2

[[subscriptions]]
name = "main"
url = " https://sub.example/prod "
is_base64 = true
scheme = "vless"
"#;

#[serial_test::serial]
#[test]
fn load_prefers_env_then_local_file_then_embedded() {
    // Isolate CWD so the repo's own config/ is never read.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing on disk → embedded default
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.poller.concurrency, 5);
    assert!(cfg.subscriptions.is_empty());

    // 2) ./config/poller.toml
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(tmp.path().join("config/poller.toml"), "[poller]\nconcurrency = 9\n").unwrap();
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.poller.concurrency, 9);

    // 3) env var wins over the local file
    let p = tmp.path().join("custom.toml");
    fs::write(&p, SAMPLE).unwrap();
    env::set_var(ENV_CONFIG_PATH, &p);
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.poller.concurrency, 2);
    assert_eq!(cfg.logger.level, "debug");
    let sources = cfg.sources().unwrap();
    assert_eq!(sources[0].url(), "https://sub.example/prod");
    assert_eq!(sources[0].scheme(), Some("vless"));

    // 4) env var to a missing file is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml"));
    assert!(matches!(AppConfig::load(), Err(ConfigError::MissingEnvPath(_))));

    env::remove_var(ENV_CONFIG_PATH);
    env::set_current_dir(old).unwrap();
}

#[serial_test::serial]
#[test]
fn malformed_file_reports_parse_error() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("broken.toml");
    fs::write(&p, "[poller\nconcurrency = ").unwrap();
    assert!(matches!(AppConfig::from_path(&p), Err(ConfigError::Parse(_))));
    assert!(matches!(
        AppConfig::from_path(&tmp.path().join("absent.toml")),
        Err(ConfigError::Read { .. })
    ));
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use iscsi_initiator_rs::{
    cfg::{
        cli::{parse_args, resolve_config_path},
        config::{AuthConfig, Config, DEFAULT_INITIATOR_NAME},
        enums::YesNo,
        logger::init_logger,
    },
    models::common::ISCSI_PORT,
    params::{AuthType, Credentials},
};
use serial_test::serial;

const MINIMAL: &str = r#"
initiator: {}
targets:
  - Host: 10.0.0.5
runtime:
  MaxTargets: 1
  TimeoutConnection: 3
"#;

#[test]
fn test_load_shipped_config() -> Result<()> {
    let cfg = Config::load_from_file(resolve_config_path("tests/config.yaml")?)?;

    assert_eq!(cfg.initiator.initiator_name, "iqn.2025-01.com.example:initiator");
    assert_eq!(cfg.initiator.initial_r2t, YesNo::No);
    let AuthConfig::Chap(chap) = &cfg.auth else {
        panic!("expected CHAP credentials");
    };
    assert_eq!(chap.username, "testuser");
    assert_eq!(chap.mutual_auth, YesNo::No);

    assert_eq!(cfg.targets.len(), 2);
    assert_eq!(cfg.targets[0].target_name, "iqn.2004-01.com.example:disk0");
    assert!(cfg.targets[1].target_name.is_empty());
    assert_eq!(cfg.runtime.max_targets, 4);
    assert_eq!(cfg.runtime.queue_depth, 32);
    assert_eq!(cfg.runtime.login_timeout, Duration::from_secs(5));

    let creds = Credentials::from(&cfg.auth);
    assert_eq!(creds.auth_type, AuthType::Chap);
    assert_eq!(creds.secret, "verysecretpassword");
    Ok(())
}

#[test]
fn test_defaults_are_filled_in() -> Result<()> {
    let cfg = Config::from_yaml_str(MINIMAL)?;
    assert_eq!(cfg.initiator.initiator_name, DEFAULT_INITIATOR_NAME);
    assert_eq!(cfg.initiator.initial_r2t, YesNo::Yes);
    assert!(matches!(cfg.auth, AuthConfig::None));
    assert_eq!(cfg.targets[0].port, ISCSI_PORT);
    assert_eq!(cfg.targets[0].name, "target0");
    assert_eq!(cfg.runtime.queue_depth, 64);
    assert_eq!(cfg.runtime.login_timeout, Duration::from_secs(5));
    Ok(())
}

#[test]
fn test_invalid_configs_are_refused() {
    let empty_secret = MINIMAL.replace(
        "initiator: {}",
        "initiator: {}\nauth:\n  AuthMethod: CHAP\n  username: u\n  secret: \"\"",
    );
    assert!(Config::from_yaml_str(&empty_secret).is_err());

    let too_many = MINIMAL.replace(
        "  - Host: 10.0.0.5",
        "  - Host: 10.0.0.5\n  - Host: 10.0.0.6",
    );
    assert!(Config::from_yaml_str(&too_many).is_err());

    let no_host = MINIMAL.replace("Host: 10.0.0.5", "Host: \"\"");
    assert!(Config::from_yaml_str(&no_host).is_err());

    let no_targets = MINIMAL.replace("  - Host: 10.0.0.5", "  []");
    assert!(Config::from_yaml_str(&no_targets).is_err());

    let digest = MINIMAL.replace("initiator: {}", "initiator:\n  Digest: CRC32C");
    assert!(Config::from_yaml_str(&digest).is_err());

    assert!(resolve_config_path("tests/does-not-exist.yaml").is_err());
}

#[test]
fn test_cli_paths() -> Result<()> {
    let paths = parse_args(Vec::<String>::new())?;
    assert!(paths.config.ends_with("tests/config.yaml"));
    assert!(paths.logger.ends_with("tests/config_logger.yaml"));
    assert!(paths.config.is_absolute());

    let swapped = parse_args(vec![
        "tests/config_logger.yaml".to_string(),
        "tests/config.yaml".to_string(),
    ])?;
    assert_eq!(swapped.config, paths.logger);

    assert!(parse_args(["a", "b", "c"].map(String::from)).is_err());
    assert!(parse_args(vec![String::new()]).is_err());
    Ok(())
}

#[test]
#[serial]
fn test_logger_rejects_unknown_output() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("iscsi-logger-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("logger.yaml");
    std::fs::write(&path, "logger:\n  level: info\n  output: syslog\n")?;

    let res = init_logger(&path.to_string_lossy());
    assert!(res.is_err());
    assert!(init_logger("tests/missing_logger.yaml").is_err());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
#[serial]
fn test_logger_installs_once() -> Result<()> {
    let path = resolve_config_path("tests/config_logger.yaml")?;
    let _guard = init_logger(&path.to_string_lossy())?;
    tracing::info!(target: "unit", "logger installed");
    assert!(init_logger(&path.to_string_lossy()).is_err());
    Ok(())
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::{load_and_validate_config, InterfaceConfig};
use crate::errors::ConfigError;
use crate::interfaces::InterfaceFactory;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_and_validate_valid_config() {
    let file = write_config(
        r#"
stream:
  simultaneous_steps: 2
  secrets:
    token: abc
interfaces:
  - kind: frame_time
  - kind: loopback
    count: 2
  - kind: inject_script
    script: "window.ready = true"
  - kind: random_agent
"#,
    );

    let cfg = load_and_validate_config(file.path()).unwrap();
    assert_eq!(cfg.stream.simultaneous_steps, 2);
    assert_eq!(cfg.stream.secrets.get("token").map(String::as_str), Some("abc"));
    assert_eq!(cfg.interfaces.len(), 4);

    let interfaces = InterfaceFactory::new().build_all(&cfg.interfaces);
    let names: Vec<&str> = interfaces.iter().map(|i| i.name()).collect();
    assert_eq!(names, vec!["frame_time", "loopback", "inject_script", "random_agent"]);
}

#[test]
fn test_invalid_config_lists_every_rule() {
    let file = write_config(
        r#"
stream:
  lowball: 0
  max_relaunch_attempts: 0
"#,
    );

    let err = load_and_validate_config(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ConfigError::Invalid(ref errors) if errors.len() == 2));
    assert!(message.starts_with("Configuration validation failed:"));
    assert!(message.contains("lowball must be in (0, 1]"));
    assert!(message.contains("max_relaunch_attempts must be at least 1"));
}

#[test]
fn test_malformed_yaml_is_a_yaml_error() {
    let file = write_config("interfaces: [kind: loopback");
    assert!(matches!(
        load_and_validate_config(file.path()),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate_config(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_image_rect_reads_three_channels() {
    let file = write_config(
        r#"
interfaces:
  - kind: image_rect
    width: 8
    height: 6
"#,
    );
    let cfg = load_and_validate_config(file.path()).unwrap();
    assert!(matches!(
        cfg.interfaces[0],
        InterfaceConfig::ImageRect { width: 8, height: 6, x: 0, y: 0 }
    ));
}

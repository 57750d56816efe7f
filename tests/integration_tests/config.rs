//! End-to-end configuration loading (spec.md §6): `Config::load` reading
//! a real file from disk, as opposed to `config.rs`'s in-memory
//! `Config::parse` unit tests.

use std::io::Write;

use woodpecker_reactor::config::Config;

#[test]
fn load_reads_and_parses_a_real_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "\
Settings:
  MinWait: 1500
  PeckWait: 750
Outputs:
  - Porch:
      Type: Memory
  - Log:
      Type: File
      Path: /tmp/woodpecker-test.log
Birds:
  - Downy:
      Static: [Porch]
      Forward: [Log]
"
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.settings.min_wait, 1500);
    assert_eq!(config.settings.peck_wait, 750);
    assert_eq!(config.settings.max_wait, 4000, "unset keys keep spec.md's default");
    assert_eq!(config.outputs.len(), 2);
    assert_eq!(config.birds.len(), 1);
}

#[test]
fn load_reports_missing_file() {
    let err = Config::load("/nonexistent/path/woodpecker.yaml").unwrap_err();
    assert!(matches!(err, woodpecker_reactor::config::ConfigError::Read { .. }));
}

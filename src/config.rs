//! Configuration document loader (spec.md §6 "Configuration document").
//! Loads and validates the YAML document describing reactor `Settings`,
//! `Outputs`, and `Birds`; the reactor itself has no dependency on this
//! module, it only produces plain data the application layer feeds into
//! `add_server`/`add_timer`/`add_user_event` calls.
//!
//! Built on `serde`/`serde_yaml`, matching the config-module shape used
//! by `akitamiabtc-yuv`'s `NodeConfig` (one struct per document section,
//! `#[serde(default = "...")]` for defaulted scalars) and grounded in
//! `kata-containers`' vendored `serde_yaml` for the crate choice itself.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("output \"{name}\" has Type=File but no Path")]
    MissingPath { name: String },
    #[error("output \"{name}\" has Type=GPIO but no Pin")]
    MissingPin { name: String },
    #[error("bird \"{bird}\" references unknown output \"{output}\"")]
    UnknownOutput { bird: String, output: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_min_wait() -> u32 {
    1000
}
fn default_max_wait() -> u32 {
    4000
}
fn default_min_pecks() -> u32 {
    1
}
fn default_max_pecks() -> u32 {
    3
}
fn default_peck_wait() -> u32 {
    500
}

/// Spec.md §6: "Defaults when a `Settings` key is absent:
/// (1000, 4000, 1, 3, 500)".
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct Settings {
    #[serde(default = "default_min_wait")]
    pub min_wait: u32,
    #[serde(default = "default_max_wait")]
    pub max_wait: u32,
    #[serde(default = "default_min_pecks")]
    pub min_pecks: u32,
    #[serde(default = "default_max_pecks")]
    pub max_pecks: u32,
    #[serde(default = "default_peck_wait")]
    pub peck_wait: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            min_wait: default_min_wait(),
            max_wait: default_max_wait(),
            min_pecks: default_min_pecks(),
            max_pecks: default_max_pecks(),
            peck_wait: default_peck_wait(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OutputType {
    Memory,
    File,
    #[serde(rename = "GPIO")]
    Gpio,
}

/// One `Outputs` entry. `Path`/`Pin` are required only for the matching
/// `Type`; that conditional requirement is validated in `Config::load`
/// rather than expressed structurally, since spec.md models the three
/// output kinds as one flat shape with optional fields, not an enum with
/// per-variant payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    #[serde(rename = "Type")]
    pub output_type: OutputType,
    #[serde(rename = "Path", default)]
    pub path: Option<String>,
    #[serde(rename = "Pin", default)]
    pub pin: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BirdSpec {
    #[serde(rename = "Static", default)]
    pub static_outputs: Vec<String>,
    #[serde(rename = "Back", default)]
    pub back_outputs: Vec<String>,
    #[serde(rename = "Forward", default)]
    pub forward_outputs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDocument {
    #[serde(rename = "Settings", default)]
    settings: Settings,
    #[serde(rename = "Outputs", default)]
    outputs: Vec<HashMap<String, OutputSpec>>,
    #[serde(rename = "Birds", default)]
    birds: Vec<HashMap<String, BirdSpec>>,
}

/// The fully validated, loaded configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub outputs: HashMap<String, OutputSpec>,
    pub birds: HashMap<String, BirdSpec>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    fn parse(text: &str, path_display: &str) -> Result<Self> {
        let raw: RawDocument =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path_display.to_string(),
                source,
            })?;

        let mut outputs = HashMap::new();
        for entry in raw.outputs {
            for (name, spec) in entry {
                match spec.output_type {
                    OutputType::File if spec.path.is_none() => {
                        return Err(ConfigError::MissingPath { name });
                    }
                    OutputType::Gpio if spec.pin.is_none() => {
                        return Err(ConfigError::MissingPin { name });
                    }
                    _ => {}
                }
                outputs.insert(name, spec);
            }
        }

        let mut birds = HashMap::new();
        for entry in raw.birds {
            for (name, spec) in entry {
                for output in spec
                    .static_outputs
                    .iter()
                    .chain(spec.back_outputs.iter())
                    .chain(spec.forward_outputs.iter())
                {
                    if !outputs.contains_key(output) {
                        return Err(ConfigError::UnknownOutput {
                            bird: name.clone(),
                            output: output.clone(),
                        });
                    }
                }
                birds.insert(name, spec);
            }
        }

        Ok(Config {
            settings: raw.settings,
            outputs,
            birds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_match_spec() {
        let doc = "Settings: {}\n";
        let raw: RawDocument = serde_yaml::from_str(doc).unwrap();
        assert_eq!(raw.settings.min_wait, 1000);
        assert_eq!(raw.settings.max_wait, 4000);
        assert_eq!(raw.settings.min_pecks, 1);
        assert_eq!(raw.settings.max_pecks, 3);
        assert_eq!(raw.settings.peck_wait, 500);
    }

    #[test]
    fn file_output_without_path_is_rejected() {
        let doc = "Outputs:\n  - Desk:\n      Type: File\n";
        let err = Config::parse(doc, "test.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath { .. }));
    }

    #[test]
    fn gpio_output_without_pin_is_rejected() {
        let doc = "Outputs:\n  - Relay:\n      Type: GPIO\n";
        let err = Config::parse(doc, "test.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingPin { .. }));
    }

    #[test]
    fn bird_referencing_unknown_output_is_rejected() {
        let doc = "Outputs:\n  - Desk:\n      Type: Memory\nBirds:\n  - Robin:\n      Static: [Ghost]\n";
        let err = Config::parse(doc, "test.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOutput { .. }));
    }

    #[test]
    fn unknown_type_value_is_a_hard_error() {
        let doc = "Outputs:\n  - Desk:\n      Type: Printer\n";
        assert!(Config::parse(doc, "test.yaml").is_err());
    }

    #[test]
    fn unknown_key_inside_outputs_is_a_hard_error() {
        let doc = "Outputs:\n  - Desk:\n      Type: Memory\n      Color: Blue\n";
        assert!(Config::parse(doc, "test.yaml").is_err());
    }

    #[test]
    fn full_document_loads_successfully() {
        let doc = "\
Settings:
  MinWait: 500
  MaxWait: 2000
Outputs:
  - Desk:
      Type: Memory
  - Log:
      Type: File
      Path: /tmp/woodpecker.log
  - Relay:
      Type: GPIO
      Pin: 17
Birds:
  - Robin:
      Static: [Desk]
      Forward: [Log, Relay]
";
        let cfg = Config::parse(doc, "test.yaml").unwrap();
        assert_eq!(cfg.settings.min_wait, 500);
        assert_eq!(cfg.settings.max_wait, 2000);
        assert_eq!(cfg.outputs.len(), 3);
        assert_eq!(cfg.birds.len(), 1);
    }
}

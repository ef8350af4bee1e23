//! JSON description of a pipeline run.
//!
//! ```json
//! {
//!   "config": { "threads": 4, "verify_terminal": true },
//!   "stages": [
//!     { "circuit": "main", "inputs": { "x": 1, "y": 2, "z": "3" } },
//!     { "circuit": "rec1", "inputs": { "c": 3 } },
//!     { "circuit": "rec2", "inputs": { "d": 4 }, "role": "terminal_only" }
//!   ]
//! }
//! ```

use std::path::Path;

use common::inputs::{InputMap, InputValue};
use common::serializable::JsonSerializable;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use super::{Pipeline, PipelineConfig, StageSpec};
use crate::host::catalog::{MAIN, REC1, REC2};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineManifest {
    #[serde(default)]
    pub config: PipelineConfig,
    pub stages: Vec<StageSpec>,
}

impl PipelineManifest {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> eyre::Result<Self> {
        Self::deserialize_from_file(path)
            .wrap_err_with(|| format!("failed to read manifest {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> eyre::Result<()> {
        self.serialize_to_file(path)
            .wrap_err_with(|| format!("failed to write manifest {}", path.display()))
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.stages.clone())
    }

    /// `main` on `x = 1, y = 2, z = 3`, then `rec1` with `c = 3` and `rec2` with `d = 4`.
    pub fn standard_chain() -> Self {
        let inputs = |entries: &[(&str, u64)]| -> InputMap {
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), InputValue::from(*value)))
                .collect()
        };
        Self {
            config: PipelineConfig::default(),
            stages: vec![
                StageSpec::new(MAIN, inputs(&[("x", 1), ("y", 2), ("z", 3)])),
                StageSpec::new(REC1, inputs(&[("c", 3)])),
                StageSpec::new(REC2, inputs(&[("d", 4)])),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageRole;

    #[test]
    fn parse_with_defaults() {
        let manifest = PipelineManifest::from_json(
            r#"{
                "stages": [
                    { "circuit": "main", "inputs": { "x": 1, "y": "2", "z": "0x3" } },
                    { "circuit": "rec1", "inputs": { "c": 3 }, "role": "terminal_only" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.config, PipelineConfig::default());
        assert_eq!(manifest.stages.len(), 2);
        assert_eq!(manifest.stages[0].role, StageRole::Embedded);
        assert_eq!(manifest.stages[1].role, StageRole::TerminalOnly);
        assert_eq!(manifest.stages[0].inputs["y"], InputValue::from("2"));
        assert_eq!(manifest.pipeline().stages(), manifest.stages.as_slice());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = PipelineManifest::from_json(
            r#"{ "stages": [ { "circuit": "main", "role": "sideways" } ] }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("proof-chain-manifest-{}", std::process::id()));
        let path = dir.join("chain.json");
        let manifest = PipelineManifest::standard_chain();
        manifest.save(&path).unwrap();
        assert_eq!(PipelineManifest::load(&path).unwrap(), manifest);
        std::fs::remove_dir_all(dir).unwrap();
    }
}

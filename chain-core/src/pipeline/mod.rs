//! Sequential driver for a chain of stages.
//!
//! Stage 0 is proved from its own inputs. Every later stage receives the
//! previous stage's proof through the recursion fields and verifies it
//! in-circuit. The terminal proof is optionally verified at the end.

use std::fmt;
use std::sync::Arc;

use common::constants::DEFAULT_PROVER_THREADS;
use common::inputs::InputMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::backend::{BackendFactory, BackendOptions, PublicInputs};
use crate::host::CircuitLoader;
use crate::prover::{ProofGenerator, StageProof};
use crate::r1cs::CompiledCircuit;
use crate::recursion::{CircuitInputs, RecursiveInputBuilder};
use crate::utils::errors::ChainError;
use crate::verifier::ProofVerifier;

pub mod manifest;
#[cfg(test)]
mod tests;

/// Whether a stage's proof is handed to a later stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Proved with a recursion-capable backend.
    #[default]
    Embedded,
    /// Only verified natively; must be the last stage.
    TerminalOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub circuit: String,
    #[serde(default)]
    pub inputs: InputMap,
    #[serde(default)]
    pub role: StageRole,
}

impl StageSpec {
    pub fn new(circuit: impl Into<String>, inputs: InputMap) -> Self {
        Self {
            circuit: circuit.into(),
            inputs,
            role: StageRole::Embedded,
        }
    }

    pub fn terminal_only(mut self) -> Self {
        self.role = StageRole::TerminalOnly;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub threads: usize,
    pub verify_terminal: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_PROVER_THREADS,
            verify_terminal: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum StageState {
    Uncompiled,
    Compiled,
    WitnessBuilt,
    ProofBuilt,
    ArtifactsExtracted,
    ConsumedByNextStage,
    Verified,
    /// The terminal proof was evaluated and rejected.
    Rejected,
    Failed(ChainError),
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(<&'static str>::from(self))
    }
}

/// A completed stage.
#[derive(Clone, Debug)]
pub struct StageReport {
    pub index: usize,
    pub circuit: Arc<CompiledCircuit>,
    pub role: StageRole,
    /// Inputs as executed, recursion fields included.
    pub inputs: InputMap,
    pub proof: StageProof,
    pub history: Vec<StageState>,
}

impl StageReport {
    pub fn state(&self) -> Option<&StageState> {
        self.history.last()
    }

    pub fn public_inputs(&self) -> &PublicInputs {
        &self.proof.public_inputs
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub stages: Vec<StageReport>,
    /// `None` when terminal verification was disabled.
    pub verified: Option<bool>,
}

impl PipelineOutcome {
    pub fn terminal(&self) -> Option<&StageReport> {
        self.stages.last()
    }

    /// Public inputs of every stage, intermediate ones included.
    pub fn public_inputs(&self) -> Vec<&PublicInputs> {
        self.stages.iter().map(StageReport::public_inputs).collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("stage {stage} (`{circuit}`) failed after {}: {source}", last_state(.history))]
pub struct PipelineError {
    pub stage: usize,
    pub circuit: String,
    /// States the stage went through, ending in `Failed`.
    pub history: Vec<StageState>,
    #[source]
    pub source: ChainError,
}

fn last_state(history: &[StageState]) -> String {
    history
        .iter()
        .rev()
        .find(|state| !matches!(state, StageState::Failed(_)))
        .map(ToString::to_string)
        .unwrap_or_else(|| StageState::Uncompiled.to_string())
}

impl PipelineError {
    pub fn last_state(&self) -> String {
        last_state(&self.history)
    }
}

/// Tracks one stage's state history and logs each transition.
struct StageTracker<'a> {
    index: usize,
    circuit: &'a str,
    history: Vec<StageState>,
}

impl<'a> StageTracker<'a> {
    fn new(index: usize, circuit: &'a str) -> Self {
        Self {
            index,
            circuit,
            history: vec![StageState::Uncompiled],
        }
    }

    fn advance(&mut self, state: StageState) {
        tracing::info!(stage = self.index, circuit = self.circuit, state = %state, "stage transition");
        self.history.push(state);
    }

    fn fail(&mut self, source: ChainError) -> PipelineError {
        tracing::error!(stage = self.index, circuit = self.circuit, error = %source, "stage failed");
        self.history.push(StageState::Failed(source.clone()));
        PipelineError {
            stage: self.index,
            circuit: self.circuit.to_string(),
            history: std::mem::take(&mut self.history),
            source,
        }
    }
}

/// An ordered list of stages, run once per [`Pipeline::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<StageSpec>,
}

impl Pipeline {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let last = self.stages.len().saturating_sub(1);
        for (index, spec) in self.stages.iter().enumerate() {
            if spec.role == StageRole::TerminalOnly && index != last {
                return Err(StageTracker::new(index, &spec.circuit).fail(ChainError::compilation(
                    spec.circuit.as_str(),
                    "a terminal-only stage cannot be consumed by a later stage",
                )));
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, name = "Pipeline::run")]
    pub fn run(
        &self,
        loader: &dyn CircuitLoader,
        config: &PipelineConfig,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.validate()?;
        tracing::info!(stages = self.stages.len(), threads = config.threads, "running pipeline");

        let mut reports: Vec<StageReport> = Vec::with_capacity(self.stages.len());
        for (index, spec) in self.stages.iter().enumerate() {
            let mut tracker = StageTracker::new(index, &spec.circuit);
            let report = self
                .run_stage(index, spec, reports.last(), loader, config, &mut tracker)
                .map_err(|source| tracker.fail(source))?;
            if let Some(previous) = reports.last_mut() {
                let mut tracker = StageTracker::new(previous.index, previous.circuit.name());
                tracker.history = std::mem::take(&mut previous.history);
                tracker.advance(StageState::ConsumedByNextStage);
                previous.history = tracker.history;
            }
            reports.push(report);
        }

        let mut verified = None;
        if config.verify_terminal {
            if let Some(terminal) = reports.last_mut() {
                let mut tracker = StageTracker::new(terminal.index, terminal.circuit.name());
                tracker.history = std::mem::take(&mut terminal.history);
                let options = stage_options(terminal.role, config);
                let result = ProofVerifier::with_options(options).verify(
                    terminal.circuit.clone(),
                    &terminal.proof.proof,
                    &terminal.proof.public_inputs,
                );
                match result {
                    Ok(accepted) => {
                        tracker.advance(if accepted {
                            StageState::Verified
                        } else {
                            StageState::Rejected
                        });
                        terminal.history = tracker.history;
                        verified = Some(accepted);
                    }
                    Err(source) => return Err(tracker.fail(source)),
                }
            }
        }

        tracing::info!(
            verified = ?verified,
            stages = %reports.iter().map(|report| report.circuit.name()).join(" -> "),
            "pipeline finished"
        );
        Ok(PipelineOutcome {
            stages: reports,
            verified,
        })
    }

    fn run_stage(
        &self,
        index: usize,
        spec: &StageSpec,
        previous: Option<&StageReport>,
        loader: &dyn CircuitLoader,
        config: &PipelineConfig,
        tracker: &mut StageTracker<'_>,
    ) -> Result<StageReport, ChainError> {
        let circuit = loader.load(&spec.circuit)?;
        tracker.advance(StageState::Compiled);

        let options = stage_options(spec.role, config);
        let stage = BackendFactory::new(options).bind(circuit.clone())?;
        let inputs = match previous {
            None => CircuitInputs::from_map(spec.inputs.clone())?,
            Some(parent) => {
                RecursiveInputBuilder::new(&parent.proof.public_inputs, &parent.proof.artifacts)
                    .with_inputs(spec.inputs.clone())
                    .build()?
            }
        };

        let witness = stage.engine().execute(&inputs)?;
        tracker.advance(StageState::WitnessBuilt);

        let generator = ProofGenerator::new(stage.backend());
        let (proof, public_inputs) = generator.prove(&witness)?;
        tracker.advance(StageState::ProofBuilt);

        let artifacts =
            generator.extract_artifacts(&proof, &public_inputs, circuit.num_public_inputs())?;
        tracker.advance(StageState::ArtifactsExtracted);

        Ok(StageReport {
            index,
            circuit,
            role: spec.role,
            inputs: inputs.to_input_map(),
            proof: StageProof {
                proof,
                public_inputs,
                artifacts,
            },
            history: std::mem::take(&mut tracker.history),
        })
    }
}

fn stage_options(role: StageRole, config: &PipelineConfig) -> BackendOptions {
    BackendOptions {
        threads: config.threads,
        recursive: role == StageRole::Embedded,
    }
}

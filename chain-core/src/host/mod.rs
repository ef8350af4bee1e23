use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::r1cs::CompiledCircuit;
use crate::utils::errors::ChainError;

pub mod catalog;

/// Resolves circuit ids to compiled circuits.
pub trait CircuitLoader {
    fn load(&self, circuit_id: &str) -> Result<Arc<CompiledCircuit>, ChainError>;
}

/// Produces one circuit. Recursive circuits load the circuit they verify through `loader`.
pub trait CircuitCompiler: Send + Sync {
    fn compile(&self, loader: &dyn CircuitLoader) -> Result<CompiledCircuit, ChainError>;
}

impl<F> CircuitCompiler for F
where
    F: Fn(&dyn CircuitLoader) -> Result<CompiledCircuit, ChainError> + Send + Sync,
{
    fn compile(&self, loader: &dyn CircuitLoader) -> Result<CompiledCircuit, ChainError> {
        self(loader)
    }
}

/// Compiler for circuits already serialized to program bytes.
struct ProgramBytes(Vec<u8>);

impl CircuitCompiler for ProgramBytes {
    fn compile(&self, _: &dyn CircuitLoader) -> Result<CompiledCircuit, ChainError> {
        CompiledCircuit::from_bytes(&self.0)
    }
}

/// A [`CircuitLoader`] over registered compilers.
///
/// Each circuit is compiled at most once and shared afterwards.
#[derive(Default)]
pub struct CircuitRegistry {
    compilers: BTreeMap<String, Box<dyn CircuitCompiler>>,
    cache: Mutex<HashMap<String, Arc<CompiledCircuit>>>,
    in_progress: Mutex<Vec<String>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, circuit_id: &str, compiler: impl CircuitCompiler + 'static) -> Self {
        self.compilers
            .insert(circuit_id.to_string(), Box::new(compiler));
        self
    }

    pub fn register_program(self, circuit_id: &str, bytes: Vec<u8>) -> Self {
        self.register(circuit_id, ProgramBytes(bytes))
    }

    pub fn register_program_file(
        self,
        circuit_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<Self, ChainError> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            ChainError::compilation(circuit_id, format!("{}: {e}", path.as_ref().display()))
        })?;
        Ok(self.register_program(circuit_id, bytes))
    }

    pub fn circuit_ids(&self) -> impl Iterator<Item = &str> {
        self.compilers.keys().map(String::as_str)
    }

    fn lock<'a, T>(
        mutex: &'a Mutex<T>,
        circuit_id: &str,
    ) -> Result<MutexGuard<'a, T>, ChainError> {
        mutex
            .lock()
            .map_err(|_| ChainError::compilation(circuit_id, "circuit registry lock poisoned"))
    }

    fn compile_uncached(&self, circuit_id: &str) -> Result<CompiledCircuit, ChainError> {
        let compiler = self
            .compilers
            .get(circuit_id)
            .ok_or_else(|| ChainError::compilation(circuit_id, "unknown circuit"))?;

        {
            let mut in_progress = Self::lock(&self.in_progress, circuit_id)?;
            if in_progress.iter().any(|id| id == circuit_id) {
                let chain = in_progress.join(" -> ");
                return Err(ChainError::compilation(
                    circuit_id,
                    format!("cyclic circuit dependency: {chain} -> {circuit_id}"),
                ));
            }
            in_progress.push(circuit_id.to_string());
        }
        // the inner circuit is checked while this one is still in progress,
        // so a slot naming its own circuit is reported as a cycle
        let result = compiler
            .compile(self)
            .and_then(|circuit| self.check_compiled(circuit_id, circuit));
        Self::lock(&self.in_progress, circuit_id)?.retain(|id| id != circuit_id);

        let circuit = result?;
        if circuit.name() != circuit_id {
            return Err(ChainError::compilation(
                circuit_id,
                format!("compiler produced circuit `{}`", circuit.name()),
            ));
        }
        Ok(circuit)
    }
}

impl CircuitRegistry {
    fn check_compiled(
        &self,
        circuit_id: &str,
        circuit: CompiledCircuit,
    ) -> Result<CompiledCircuit, ChainError> {
        circuit.validate()?;
        if let Some(slot) = circuit.recursion() {
            let inner = self.load(&slot.inner_circuit)?;
            slot.check_inner(&inner)
                .map_err(|reason| ChainError::compilation(circuit_id, reason))?;
        }
        Ok(circuit)
    }
}

impl CircuitLoader for CircuitRegistry {
    #[tracing::instrument(skip_all, name = "CircuitRegistry::load", fields(circuit = circuit_id))]
    fn load(&self, circuit_id: &str) -> Result<Arc<CompiledCircuit>, ChainError> {
        if let Some(circuit) = Self::lock(&self.cache, circuit_id)?.get(circuit_id) {
            return Ok(circuit.clone());
        }

        let circuit = Arc::new(self.compile_uncached(circuit_id)?);
        tracing::debug!(
            constraints = circuit.constraints().len(),
            assignment_len = circuit.assignment_len(),
            "circuit compiled"
        );
        Ok(Self::lock(&self.cache, circuit_id)?
            .entry(circuit_id.to_string())
            .or_insert(circuit)
            .clone())
    }
}

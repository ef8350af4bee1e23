use std::any::Any;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::{bail, eyre, Result, WrapErr};
use serde::Serialize;
use tracing_chrome::ChromeLayerBuilder;
use tracing_subscriber::{self, fmt::format::FmtSpan, prelude::*, EnvFilter};

use chain_core::backend::{BackendOptions, Proof, PublicInputs};
use chain_core::host::catalog::standard_registry;
use chain_core::host::{CircuitLoader, CircuitRegistry};
use chain_core::pipeline::manifest::PipelineManifest;
use chain_core::pipeline::{PipelineOutcome, StageRole};
use chain_core::utils::serializable::Serializable;
use chain_core::verifier::ProofVerifier;

/// Build and verify chains of recursively composed proofs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output formats
    #[clap(short, long, value_enum, global = true)]
    format: Option<Vec<Format>>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the standard main -> rec1 -> rec2 chain
    Demo(RunArgs),
    /// Run the chain described by a JSON manifest
    Run {
        /// Path to the pipeline manifest
        #[clap(short, long)]
        manifest: PathBuf,

        #[clap(flatten)]
        run: RunArgs,
    },
    /// Verify a saved proof against a circuit
    Verify(VerifyArgs),
    /// List the known circuits
    Circuits {
        /// Write each circuit's program bytes to `<DIR>/<id>.circuit`
        #[clap(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Prover threads; 0 uses every core
    #[clap(short, long)]
    threads: Option<usize>,

    /// Skip verification of the terminal proof
    #[clap(long)]
    no_verify: bool,

    /// Save each stage's proof, public inputs and artifacts here
    #[clap(short, long)]
    out_dir: Option<PathBuf>,

    /// Extra circuits as `ID=PATH` to a program file
    #[clap(long = "program", value_name = "ID=PATH")]
    programs: Vec<String>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Circuit the proof was generated for
    #[clap(short, long)]
    circuit: String,

    #[clap(short, long)]
    proof: PathBuf,

    #[clap(long)]
    public_inputs: PathBuf,

    /// The proof came from a terminal-only stage
    #[clap(long)]
    terminal_only: bool,

    #[clap(short, long, default_value_t = 0)]
    threads: usize,

    /// Extra circuits as `ID=PATH` to a program file
    #[clap(long = "program", value_name = "ID=PATH")]
    programs: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum, PartialEq)]
enum Format {
    Default,
    Chrome,
}

#[derive(Serialize)]
struct StageSummary<'a> {
    stage: usize,
    circuit: &'a str,
    public_inputs: Vec<String>,
    proof_bytes: usize,
    history: Vec<String>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    verified: Option<bool>,
    stages: Vec<StageSummary<'a>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guards = init_tracing(cli.format.as_deref());

    match cli.command {
        Commands::Demo(args) => run(PipelineManifest::standard_chain(), args),
        Commands::Run { manifest, run: args } => run(PipelineManifest::load(&manifest)?, args),
        Commands::Verify(args) => verify(args),
        Commands::Circuits { export_dir } => list_circuits(export_dir.as_deref()),
    }
}

fn init_tracing(format: Option<&[Format]>) -> Vec<Box<dyn Any>> {
    let mut layers = Vec::new();

    let log_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(log_filter)
        .boxed();
    layers.push(log_layer);

    let mut guards: Vec<Box<dyn Any>> = vec![];
    if let Some(format) = format {
        if format.contains(&Format::Default) {
            let collector_layer = tracing_subscriber::fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .compact()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .boxed();
            layers.push(collector_layer);
        }
        if format.contains(&Format::Chrome) {
            let (chrome_layer, guard) = ChromeLayerBuilder::new().include_args(true).build();
            layers.push(chrome_layer.boxed());
            guards.push(Box::new(guard));
            tracing::info!("Running tracing-chrome. Files will be saved as trace-<some timestamp>.json and can be viewed in https://ui.perfetto.dev/");
        }
    }

    tracing_subscriber::registry().with(layers).init();
    guards
}

fn registry(programs: &[String]) -> Result<CircuitRegistry> {
    let mut registry = standard_registry();
    for program in programs {
        let (id, path) = program
            .split_once('=')
            .ok_or_else(|| eyre!("expected ID=PATH, got `{program}`"))?;
        registry = registry.register_program_file(id, path)?;
    }
    Ok(registry)
}

fn run(mut manifest: PipelineManifest, args: RunArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        manifest.config.threads = threads;
    }
    if args.no_verify {
        manifest.config.verify_terminal = false;
    }

    let registry = registry(&args.programs)?;
    let outcome = manifest.pipeline().run(&registry, &manifest.config)?;

    if let Some(out_dir) = &args.out_dir {
        save_outcome(&outcome, out_dir)?;
        manifest.save(&out_dir.join("manifest.json"))?;
    }
    println!("{}", serde_json::to_string_pretty(&summarize(&outcome))?);

    match outcome.verified {
        Some(false) => bail!("terminal proof was rejected"),
        _ => Ok(()),
    }
}

fn summarize(outcome: &PipelineOutcome) -> RunSummary<'_> {
    RunSummary {
        verified: outcome.verified,
        stages: outcome
            .stages
            .iter()
            .map(|report| StageSummary {
                stage: report.index,
                circuit: report.circuit.name(),
                public_inputs: report.public_inputs().to_decimal_strings(),
                proof_bytes: report.proof.proof.bytes.len(),
                history: report.history.iter().map(ToString::to_string).collect(),
            })
            .collect(),
    }
}

fn save_outcome(outcome: &PipelineOutcome, out_dir: &Path) -> Result<()> {
    for report in &outcome.stages {
        let stem = format!("stage-{}-{}", report.index, report.circuit.name());
        report
            .proof
            .proof
            .save_to_file(out_dir.join(format!("{stem}.proof")))?;
        report
            .proof
            .public_inputs
            .save_to_file(out_dir.join(format!("{stem}.public_inputs")))?;
        report
            .proof
            .artifacts
            .save_to_file(out_dir.join(format!("{stem}.artifacts")))?;
    }
    tracing::info!(out_dir = %out_dir.display(), "saved stage proofs");
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let registry = registry(&args.programs)?;
    let circuit = registry.load(&args.circuit)?;
    let proof = Proof::from_file(&args.proof)
        .wrap_err_with(|| format!("failed to read proof {}", args.proof.display()))?;
    let public_inputs = PublicInputs::from_file(&args.public_inputs).wrap_err_with(|| {
        format!(
            "failed to read public inputs {}",
            args.public_inputs.display()
        )
    })?;

    let role = if args.terminal_only {
        StageRole::TerminalOnly
    } else {
        StageRole::Embedded
    };
    let verifier = ProofVerifier::with_options(BackendOptions {
        threads: args.threads,
        recursive: role == StageRole::Embedded,
    });
    if verifier.verify(circuit, &proof, &public_inputs)? {
        println!("proof verified");
        Ok(())
    } else {
        bail!("proof rejected")
    }
}

fn list_circuits(export_dir: Option<&Path>) -> Result<()> {
    let registry = standard_registry();
    let ids: Vec<String> = registry.circuit_ids().map(str::to_string).collect();
    for id in ids {
        let circuit = registry.load(&id)?;
        let digest = hex::encode(circuit.digest()?);
        let inputs: Vec<&str> = circuit.inputs().iter().map(|decl| decl.name.as_str()).collect();
        println!(
            "{id}: inputs [{}], {} constraints, assignment {}, verifies {}, digest {digest}",
            inputs.join(", "),
            circuit.constraints().len(),
            circuit.assignment_len(),
            circuit
                .recursion()
                .map(|slot| slot.inner_circuit.as_str())
                .unwrap_or("-"),
        );
        if let Some(dir) = export_dir {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join(format!("{id}.circuit")), circuit.to_bytes()?)?;
        }
    }
    Ok(())
}

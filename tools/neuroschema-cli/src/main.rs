use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use neuroschema::{
    detect_schema, ArchitectureCompiler, CompilerConfig, DetectorConfig, InterpretationRegistry, JsonLinesSource,
    Result, Schema,
};

/// Detect schemas from sampled JSON data and compile them into network architectures
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the schema of a JSON lines file and print it
    Detect {
        /// File holding one JSON object per line
        samples: PathBuf,

        /// Maximum number of objects to sample
        #[arg(short, long, default_value_t = 1000)]
        count: usize,

        /// Detector configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compile an input and an output schema into runtime source files
    Compile {
        input_schema: PathBuf,
        output_schema: PathBuf,

        /// Directory receiving the generated files
        #[arg(short, long)]
        out: PathBuf,

        /// Compiler configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the tensor layout of a schema
    TensorSchema { schema: PathBuf },
}

fn read_schema(path: &Path) -> Result<Schema> {
    Schema::from_json_str(&fs::read_to_string(path)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays pipeable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = InterpretationRegistry::with_defaults();

    match cli.command {
        Commands::Detect { samples, count, config } => {
            let config = match config {
                Some(path) => DetectorConfig::from_file(path)?,
                None => DetectorConfig::default(),
            };
            let mut source = JsonLinesSource::new(&samples);
            info!(samples = %samples.display(), count, "Detecting schema");
            let schema = detect_schema(&registry, config, &mut source, count, |done, total| {
                if done % 100 == 0 || done == total {
                    debug!(done, total, "Detection progress");
                }
                ControlFlow::Continue(())
            })?;
            println!("{}", schema.to_json_string()?);
        }
        Commands::Compile {
            input_schema,
            output_schema,
            out,
            config,
        } => {
            let config = match config {
                Some(path) => CompilerConfig::from_file(path)?,
                None => CompilerConfig::default(),
            };
            let compiler = ArchitectureCompiler::with_config(&registry, config)?;
            let compiled = compiler.compile(&read_schema(&input_schema)?, &read_schema(&output_schema)?)?;
            compiled.write_to(&out)?;
            info!(files = compiled.files.len(), out = %out.display(), "Architecture written");
        }
        Commands::TensorSchema { schema } => {
            let compiler = ArchitectureCompiler::new(&registry);
            let tensor_schema = compiler.tensor_schema(&read_schema(&schema)?)?;
            println!("{}", serde_json::to_string_pretty(&tensor_schema)?);
        }
    }
    Ok(())
}

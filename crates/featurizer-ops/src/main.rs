//! Featurizer CLI
//!
//! Packs fitted projections into archives, inspects archive headers, and runs
//! the PCATransformer kernel over a JSON batch.
//!
//! Usage:
//!     featurizer pack --components components.json --mean mean.json --precision f32 --out pca.bin
//!     featurizer inspect pca.bin
//!     featurizer transform --archive pca.bin --input rows.json --precision f64

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use featurizer_core::{ElementType, PcaTransformer};
use featurizer_ops::{
    ExecutionFrame, KernelRegistry, NodeAttributes, PcaElement, Tensor, FEATURIZERS_DOMAIN,
};
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

type CliResult<T> = std::result::Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "featurizer")]
#[command(about = "Pack, inspect, and apply pretrained PCA featurizers")]
#[command(version)]
struct Args {
    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serialize a fitted projection into an archive
    Pack {
        /// JSON matrix of principal components, one row per component
        #[arg(long)]
        components: PathBuf,

        /// JSON vector subtracted from each row before projecting
        #[arg(long)]
        mean: Option<PathBuf>,

        /// Element type stored in the archive
        #[arg(long, value_enum, default_value_t = Precision::F32)]
        precision: Precision,

        /// Archive output path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print archive metadata as JSON
    Inspect {
        /// Archive path
        archive: PathBuf,
    },

    /// Apply an archive to a JSON batch and print the projected rows
    Transform {
        /// Archive path
        #[arg(long)]
        archive: PathBuf,

        /// JSON matrix of input rows
        #[arg(long)]
        input: PathBuf,

        /// Element type the batch is fed to the kernel as
        #[arg(long, value_enum, default_value_t = Precision::F32)]
        precision: Precision,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Precision {
    F32,
    F64,
}

impl From<Precision> for ElementType {
    fn from(precision: Precision) -> Self {
        match precision {
            Precision::F32 => ElementType::Float32,
            Precision::F64 => ElementType::Float64,
        }
    }
}

#[derive(Serialize, Debug)]
struct TransformOutput {
    shape: Vec<usize>,
    rows: Vec<Vec<f64>>,
}

fn main() -> CliResult<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = match args.log_level.as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Pack {
            components,
            mean,
            precision,
            out,
        } => pack(&components, mean.as_deref(), precision, &out),
        Command::Inspect { archive } => {
            let info = featurizer_core::inspect(&fs::read(&archive)?)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Transform {
            archive,
            input,
            precision,
        } => {
            let archive = fs::read(&archive)?;
            let rows: Vec<Vec<f64>> = read_json(&input)?;
            let output = match precision {
                Precision::F32 => transform::<f32>(archive, rows)?,
                Precision::F64 => transform::<f64>(archive, rows)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Row-major matrix from nested rows; `width` is used when there are none.
fn to_matrix(rows: Vec<Vec<f64>>, width: usize) -> CliResult<(usize, usize, Vec<f64>)> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(width);
    let mut flat = Vec::with_capacity(rows.len() * cols);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(format!("row {} has {} values, expected {}", i, row.len(), cols).into());
        }
        flat.extend_from_slice(row);
    }
    Ok((rows.len(), cols, flat))
}

fn pack(
    components: &Path,
    mean: Option<&Path>,
    precision: Precision,
    out: &Path,
) -> CliResult<()> {
    let (rows, cols, flat) = to_matrix(read_json(components)?, 0)?;
    let eigenvectors = Array2::from_shape_vec((rows, cols), flat)?;
    let mean = match mean {
        Some(path) => Some(Array1::from_vec(read_json::<Vec<f64>>(path)?)),
        None => None,
    };

    let transformer = PcaTransformer::new(eigenvectors, mean)?;
    let bytes = transformer.to_bytes(precision.into())?;
    fs::write(out, &bytes)?;
    info!(
        "Packed {}x{} projection ({}) into {} ({} bytes)",
        transformer.output_dims(),
        transformer.input_dims(),
        ElementType::from(precision),
        out.display(),
        bytes.len()
    );
    Ok(())
}

fn transform<T: PcaElement>(archive: Vec<u8>, rows: Vec<Vec<f64>>) -> CliResult<TransformOutput> {
    let width = featurizer_core::inspect(&archive)?.input_dims;
    let (n, d, flat) = to_matrix(rows, width)?;
    let values = flat
        .into_iter()
        .map(T::from_f64)
        .collect::<featurizer_core::Result<Vec<T>>>()?;
    let batch = Tensor::from_vec([n, d], values)?;

    let registry = KernelRegistry::cpu();
    let kernel = registry.create("PCATransformer", FEATURIZERS_DOMAIN, &NodeAttributes::new())?;
    let mut frame = ExecutionFrame::new(vec![Tensor::from_bytes(archive), batch], 1);
    frame.run(kernel.as_ref())?;

    let output = frame
        .take_fetch(0)
        .ok_or("kernel produced no output")?;
    debug!("Output shape {}", output.shape());
    let rows = output
        .view2::<T>()?
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.to_f64()).collect())
        .collect();

    Ok(TransformOutput {
        shape: output.shape().dims().to_vec(),
        rows,
    })
}

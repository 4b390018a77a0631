//! Command-line front end for the segmentation service.
//!
//! # Usage
//!
//! ```bash
//! oar-seg --model models/orbital.onnx upload scan.nii.gz
//! oar-seg --model models/orbital.onnx segment <SESSION_ID>
//! oar-seg view <SESSION_ID> 12 --out slice12.png
//! oar-seg export <SESSION_ID> nifti --out-dir results/
//! oar-seg sweep
//! ```
//!
//! Results are printed to stdout as JSON.

use clap::{Parser, Subcommand};
use oar_seg::core::config::{ConfigLoader, SegConfig};
use oar_seg::core::init_tracing;
use oar_seg::pipeline::{ExportFormat, SegmentationService};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "oar-seg")]
#[command(about = "Segment images and NIfTI volumes and manage session artifacts")]
struct Args {
    /// TOML or JSON configuration file. `OAR_SEG_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding session data.
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// ONNX model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a file in a new session.
    Upload { file: PathBuf },
    /// Segment a session's upload.
    Segment { session_id: String },
    /// Upload and segment in one step.
    Run { file: PathBuf },
    /// Render one slice of a result.
    View {
        session_id: String,
        slice: usize,
        /// Overlay blend factor in [0, 1].
        #[arg(long)]
        alpha: Option<f32>,
        /// Write the colorized mask as PNG instead of printing data URIs.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export a result as `nifti` or `png`.
    Export {
        session_id: String,
        format: ExportFormat,
        /// Slice for PNG exports; defaults to the middle slice.
        #[arg(long)]
        slice: Option<usize>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Delete a session.
    Delete { session_id: String },
    /// Remove sessions older than the retention window.
    Sweep,
    /// List the class table.
    Classes,
    /// Report model and store status.
    Health,
}

fn load_config(args: &Args) -> Result<SegConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load_from_env()?,
    };
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(model) = &args.model {
        config.model_path = Some(model.clone());
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let service = SegmentationService::from_config(config)?;

    match args.command {
        Command::Upload { file } => print_json(&service.upload_path(&file)?),
        Command::Segment { session_id } => print_json(&service.segment(&session_id)?),
        Command::Run { file } => {
            let upload = service.upload_path(&file)?;
            print_json(&service.segment(&upload.session_id)?)
        }
        Command::View {
            session_id,
            slice,
            alpha,
            out,
        } => match out {
            Some(path) => {
                let artifact = service.export(&session_id, ExportFormat::Png, Some(slice))?;
                write_file(&path, &artifact.bytes)
            }
            None => print_json(&service.slice_view(&session_id, slice, alpha)?),
        },
        Command::Export {
            session_id,
            format,
            slice,
            out_dir,
        } => {
            let artifact = service.export(&session_id, format, slice)?;
            write_file(&out_dir.join(&artifact.file_name), &artifact.bytes)
        }
        Command::Delete { session_id } => {
            service.delete_session(&session_id)?;
            print_json(&serde_json::json!({ "deleted": session_id }))
        }
        Command::Sweep => {
            let report = service.store().sweep_expired(service.config().retention());
            print_json(&report)
        }
        Command::Classes => print_json(&service.class_info()),
        Command::Health => print_json(&service.health()),
    }
}

fn main() {
    init_tracing();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

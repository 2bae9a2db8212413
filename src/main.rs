use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use qr_styled::{ErrorCorrectionLevel, ExportFormat, Options, OutputBackend, QrCodeStyling, QrMetadata};

#[derive(Parser)]
#[command(name = "qr-styled", about = "Render styled QR codes as PNG, JPEG, WebP, BMP or SVG")]
struct Cli {
    /// Payload to encode (read from stdin when omitted)
    data: Option<String>,

    /// Path to TOML config file
    #[arg(long = "config")]
    config_path: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "png")]
    format: ExportFormat,

    /// Output file, or directory with --batch (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override width and height in pixels
    #[arg(long)]
    size: Option<u32>,

    /// Override quiet zone in pixels
    #[arg(long)]
    margin: Option<u32>,

    /// Override error correction level (L, M, Q or H)
    #[arg(long)]
    ecc: Option<ErrorCorrectionLevel>,

    /// Logo image to place in the center
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Print symbol metadata as JSON
    #[arg(long)]
    info: bool,

    /// Render every stdin line as its own symbol
    #[arg(long)]
    batch: bool,

    /// Log filter when QR_STYLED_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    #[serde(flatten)]
    metadata: QrMetadata,
    format: ExportFormat,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a Path>,
}

#[derive(Serialize)]
struct BatchLine<'a> {
    index: usize,
    data: &'a str,
    #[serde(flatten)]
    info: Option<InfoOutput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

fn error_json(error: &str) -> String {
    serde_json::to_string(&ErrorOutput {
        error: error.to_string(),
    })
    .unwrap_or_else(|_| format!("{{\"error\":{error:?}}}"))
}

fn fail(cli: &Cli, message: &str) -> ! {
    if cli.info {
        println!("{}", error_json(message));
    } else {
        eprintln!("Error: {message}");
    }
    process::exit(1);
}

fn load_config(config_path: Option<&str>) -> Options {
    'load: {
        let Some(path) = config_path else { break 'load Options::default() };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path, error = %e, "failed to read config, using defaults");
                break 'load Options::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(c) => c,
            Err(e) => {
                warn!(path, error = %e, "failed to parse config, using defaults");
                Options::default()
            }
        }
    }
}

fn build_options(cli: &Cli) -> Options {
    let mut options = load_config(cli.config_path.as_deref());
    if let Some(size) = cli.size {
        options.width = size;
        options.height = size;
    }
    if let Some(margin) = cli.margin {
        options.margin = margin;
    }
    if let Some(level) = cli.ecc {
        options.qr_options.error_correction_level = level;
    }
    if let Some(ref path) = cli.logo {
        match std::fs::read(path) {
            Ok(bytes) => options.image = Some(bytes),
            Err(e) => fail(cli, &format!("Failed to read logo {}: {e}", path.display())),
        }
    }
    // SVG can only come from the vector backend.
    if cli.format == ExportFormat::Svg {
        options.backend = OutputBackend::Vector;
    }
    options
}

fn render_one(options: Options, format: ExportFormat) -> qr_styled::Result<(Vec<u8>, QrMetadata)> {
    let mut qr = QrCodeStyling::new(options);
    let bytes = qr.export_bytes(format)?;
    Ok((bytes, qr.metadata()?))
}

fn run_single(cli: &Cli, mut options: Options) {
    let data = match cli.data.clone() {
        Some(data) => data,
        None => {
            let mut input = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut input) {
                fail(cli, &format!("Failed to read stdin: {e}"));
            }
            input.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if data.is_empty() {
        eprintln!("No input provided");
        process::exit(0);
    }
    options.data = data;

    let (bytes, metadata) = render_one(options, cli.format).unwrap_or_else(|e| fail(cli, &e.to_string()));

    match cli.output.as_deref() {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &bytes) {
                fail(cli, &format!("Failed to write {}: {e}", path.display()));
            }
            info!(path = %path.display(), bytes = bytes.len(), "wrote symbol");
        }
        None if !cli.info => {
            if let Err(e) = io::stdout().write_all(&bytes) {
                fail(cli, &format!("Failed to write output: {e}"));
            }
        }
        None => {}
    }

    if cli.info {
        let output = InfoOutput {
            metadata,
            format: cli.format,
            bytes: bytes.len(),
            output: cli.output.as_deref(),
        };
        match serde_json::to_string(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => fail(cli, &e.to_string()),
        }
    }
}

fn run_batch(cli: &Cli, options: Options) {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        fail(cli, &format!("Failed to read stdin: {e}"));
    }
    let lines: Vec<&str> = input.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if let Some(dir) = cli.output.as_deref() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            fail(cli, &format!("Failed to create {}: {e}", dir.display()));
        }
    }

    let paths: Vec<Option<PathBuf>> = (0..lines.len())
        .map(|i| cli.output.as_ref().map(|dir| dir.join(format!("{i}.{}", cli.format.extension()))))
        .collect();

    let results: Vec<BatchLine> = lines
        .par_iter()
        .zip(paths.par_iter())
        .enumerate()
        .map(|(index, (&data, path))| {
            let mut options = options.clone();
            options.data = data.to_string();
            let outcome = render_one(options, cli.format).map_err(|e| e.to_string()).and_then(|(bytes, metadata)| {
                if let Some(path) = path {
                    std::fs::write(path, &bytes).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
                }
                Ok(InfoOutput {
                    metadata,
                    format: cli.format,
                    bytes: bytes.len(),
                    output: path.as_deref(),
                })
            });
            match outcome {
                Ok(info) => BatchLine { index, data, info: Some(info), error: None },
                Err(error) => BatchLine { index, data, info: None, error: Some(error) },
            }
        })
        .collect();

    let failures = results.iter().filter(|r| r.error.is_some()).count();
    for line in &results {
        match serde_json::to_string(line) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    info!(total = results.len(), failures, "batch finished");
    if failures > 0 {
        process::exit(1);
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = qr_styled::logging::init(&cli.log_level) {
        eprintln!("Warning: {e}");
    }

    let options = build_options(&cli);
    if cli.batch {
        run_batch(&cli, options);
    } else {
        run_single(&cli, options);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use docfill_rust::{
    GenerateOptions, GenerationRequest, RuleSet, Settings, TextSection, archive, settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "docfill-rust",
    version,
    about = "Fill templated documents with serial or random values across many copies"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings", global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize text sections of a PDF and print them as JSON
    Ocr {
        pdf: PathBuf,

        /// Write the sections to this file instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Produce numbered copies of a document
    Generate {
        pdf: PathBuf,

        /// JSON array of replacement rules
        #[arg(long = "rules")]
        rules: PathBuf,

        /// Number of copies to produce
        #[arg(short = 'n', long = "copies", default_value_t = 1)]
        copies: usize,

        /// Sections JSON from `ocr`, for rules with a section_id
        #[arg(long = "sections")]
        sections: Option<PathBuf>,

        /// Zip archive to write (default: <stem>_copies.zip)
        #[arg(short = 'o', long = "output", conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Write each copy as its own file into this directory
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,

        /// Only replace exact or case-folded matches
        #[arg(long = "exact-only")]
        exact_only: bool,
    },
    /// Show the values the first copy would receive
    Preview {
        #[arg(long = "rules")]
        rules: PathBuf,
    },
    /// Run the HTTP service
    Serve {
        /// Listen address (overrides settings [server] addr)
        #[arg(long = "addr")]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    docfill_rust::logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.settings.as_deref())?;

    match cli.command {
        Command::Ocr { pdf, output } => run_ocr(&settings, &pdf, output.as_deref()).await,
        Command::Generate {
            pdf,
            rules,
            copies,
            sections,
            output,
            output_dir,
            exact_only,
        } => {
            let job = GenerateJob {
                pdf,
                rules,
                copies,
                sections,
                output,
                output_dir,
                exact_only,
            };
            run_generate(&settings, job).await
        }
        Command::Preview { rules } => {
            let rules = read_rules(&rules)?;
            for (original, value) in docfill_rust::preview_values(&rules) {
                println!("{} -> {}", original, value);
            }
            Ok(())
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| settings.server.addr.clone());
            docfill_rust::server::run_server(settings, addr).await
        }
    }
}

async fn run_ocr(settings: &Settings, pdf: &Path, output: Option<&Path>) -> Result<()> {
    let source: Arc<[u8]> = Arc::from(docfill_rust::load_source(pdf)?);
    let sections = docfill_rust::run_ocr(settings, source)
        .await
        .with_context(|| format!("ocr failed for {}", pdf.display()))?;
    let json = serde_json::to_string_pretty(&sections)?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("failed to write sections: {}", path.display()))?;
            eprintln!("{} section(s) written to {}", sections.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

struct GenerateJob {
    pdf: PathBuf,
    rules: PathBuf,
    copies: usize,
    sections: Option<PathBuf>,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    exact_only: bool,
}

async fn run_generate(settings: &Settings, job: GenerateJob) -> Result<()> {
    let source: Arc<[u8]> = Arc::from(docfill_rust::load_source(&job.pdf)?);
    let rules = read_rules(&job.rules)?;
    let sections = match job.sections.as_deref() {
        Some(path) => read_sections(path)?,
        None => Vec::new(),
    };
    let stem = docfill_rust::source_stem(&job.pdf);

    let mut options = GenerateOptions::from_settings(settings);
    if job.exact_only {
        options.locate.allow_approximate = false;
    }
    let request = GenerationRequest {
        rules,
        num_copies: job.copies,
        sections,
        stem: stem.clone(),
    };
    let docs = docfill_rust::generate_copies(options, source, request).await?;

    for doc in &docs {
        println!("{}", doc.report.summary());
    }

    if let Some(dir) = job.output_dir {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
        for doc in &docs {
            let path = dir.join(&doc.file_name);
            fs::write(&path, &doc.bytes)
                .with_context(|| format!("failed to write copy: {}", path.display()))?;
        }
        eprintln!("{} copies written to {}", docs.len(), dir.display());
        return Ok(());
    }

    let path = job
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}_copies.zip", stem)));
    let bytes = archive::package(&stem, &docs)?;
    fs::write(&path, bytes)
        .with_context(|| format!("failed to write archive: {}", path.display()))?;
    eprintln!("{} copies packaged into {}", docs.len(), path.display());
    Ok(())
}

fn read_rules(path: &Path) -> Result<RuleSet> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules: {}", path.display()))?;
    RuleSet::from_json(&raw).with_context(|| format!("in {}", path.display()))
}

fn read_sections(path: &Path) -> Result<Vec<TextSection>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read sections: {}", path.display()))?;
    let sections: Vec<TextSection> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse sections: {}", path.display()))?;
    if sections.iter().any(|section| section.id.trim().is_empty()) {
        return Err(anyhow!("sections in {} must all carry an id", path.display()));
    }
    Ok(sections)
}

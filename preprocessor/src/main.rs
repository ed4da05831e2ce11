use anyhow::{anyhow, Context};
use clap::Parser;
use generator::profile::GeneratorConfig;
use std::fs;
use std::path::{Path, PathBuf};
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, Source};

mod generator;
mod io;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Magnetometer survey preprocessing driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Binary device dump to decode and process
    #[arg(short, long)]
    mdd: Option<PathBuf>,
    /// Combined CSV export to process
    #[arg(long)]
    src: Option<PathBuf>,
    /// Delimiter of the source CSV
    #[arg(short, long)]
    delimiter: Option<String>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// System info document holding the magnetometer corrections
    #[arg(long)]
    systeminfo: Option<PathBuf>,
    /// Reference date-time, YYYYMMDD_HHMMSS.S
    #[arg(short = 't', long)]
    datetime: Option<String>,
    /// External GNSS CSV replacing the device positions
    #[arg(long)]
    gnss: Option<PathBuf>,
    /// Process every *.mdd file in this directory
    #[arg(long)]
    mdd_dir: Option<PathBuf>,
    /// Also write the decoded records as text (`_OF.csv`)
    #[arg(long, default_value_t = false)]
    save_original_format: bool,
    /// Generate and process a seeded synthetic survey
    #[arg(long, default_value_t = false)]
    synthetic: bool,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn merge_args(mut config: WorkflowConfig, args: &Args) -> WorkflowConfig {
    config.mdd = args.mdd.clone().or(config.mdd);
    config.src = args.src.clone().or(config.src);
    config.delimiter = args.delimiter.clone().or(config.delimiter);
    config.output = args.output.clone().or(config.output);
    config.systeminfo_filepath = args.systeminfo.clone().or(config.systeminfo_filepath);
    config.datetime = args.datetime.clone().or(config.datetime);
    config.gnss = args.gnss.clone().or(config.gnss);
    config.mdd_dir = args.mdd_dir.clone().or(config.mdd_dir);
    config.save_original_format |= args.save_original_format;
    config
}

fn mdd_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("mdd"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = match &args.config {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    let workflow_config = merge_args(workflow_config, &args);
    let runner = Runner::new(workflow_config.clone());

    if args.synthetic {
        let generator = GeneratorConfig {
            seed: args.seed,
            ..Default::default()
        };
        let summary = runner.process(&Source::Synthetic(generator), None)?;
        println!(
            "Synthetic run -> {} rows, {} tracks, window {} -> {}",
            summary.rows,
            summary.track_count.unwrap_or(0),
            summary.window_size.unwrap_or(0),
            summary.output.display()
        );
        return Ok(());
    }

    if let Some(dir) = &workflow_config.mdd_dir {
        let files = mdd_files(dir)?;
        log::info!("found {} MDD files in {}", files.len(), dir.display());
        let mut failed = 0;
        for path in &files {
            log::info!("processing {}", path.display());
            match runner.process(&Source::Mdd(path.clone()), None) {
                Ok(summary) => println!("{} -> {}", path.display(), summary.output.display()),
                Err(err) => {
                    log::error!("{:#}", err);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(anyhow!("{} of {} files failed", failed, files.len()));
        }
        return Ok(());
    }

    let source = match (&workflow_config.mdd, &workflow_config.src) {
        (Some(mdd), src) => {
            if src.is_some() {
                log::warn!("MDD path provided; ignoring source CSV");
            }
            Source::Mdd(mdd.clone())
        }
        (None, Some(src)) => Source::Csv(src.clone()),
        (None, None) => return Err(anyhow!("no source given: use --mdd, --src, --mdd-dir or --synthetic")),
    };
    let summary = runner.process(&source, None)?;
    println!(
        "{} rows, {} tracks -> {}",
        summary.rows,
        summary.track_count.unwrap_or(0),
        summary.output.display()
    );
    Ok(())
}

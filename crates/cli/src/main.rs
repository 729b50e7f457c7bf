//! Wordsweep CLI: audit single-word TTS assets for carrier-phrase residue and
//! regenerate the contaminated ones.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use wordsweep_core::audio::analysis::analyze;
use wordsweep_core::audio::io::decode_audio;
use wordsweep_core::audit::Auditor;
use wordsweep_core::classify::classify;
use wordsweep_core::config::{Config, Credentials};
use wordsweep_core::names::create_run_dir;
use wordsweep_core::regenerate::{plan, RegenerateOptions, Regenerator};
use wordsweep_core::report::{read_flagged_csv, write_audit_artifacts, write_regeneration_artifacts};
use wordsweep_core::storage::{AssetStore, HttpAssetStore, LocalAssetStore};
use wordsweep_core::tts::HttpSynthesizer;
use wordsweep_core::types::{AssetKey, Category};
use wordsweep_core::vocab::{cross_pairs, load_vocabulary, parse_word_list, SAMPLE_WORDS};

/// Exit status when the run finished but found something to act on.
const EXIT_FINDINGS: i32 = 2;

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "wordsweep",
    about = "Carrier-phrase contamination audit and regeneration for single-word TTS assets",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every (voice, word) asset and classify it
    Audit(AuditArgs),
    /// Re-synthesize, verify and upload replacements
    Regenerate(RegenerateArgs),
    /// Analyze and classify local audio files
    Analyze(AnalyzeArgs),
}

// ─── Shared arguments (embedded in each subcommand) ──────────────

#[derive(Args, Debug)]
struct SharedArgs {
    /// JSON config file (omitted fields keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for run artifacts
    #[arg(long, default_value = "./wordsweep-output")]
    output_dir: PathBuf,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Object storage base URL
    #[arg(long, env = "WORDSWEEP_STORAGE_URL")]
    storage_url: Option<String>,

    /// Object storage service key
    #[arg(long, env = "WORDSWEEP_STORAGE_KEY", hide_env_values = true)]
    storage_key: Option<String>,
}

#[derive(Args, Debug)]
struct PairArgs {
    /// Voices to process: "nova,echo"
    #[arg(long, value_delimiter = ',')]
    voices: Vec<String>,

    /// Words to process: "dog,cat,ice cream"
    #[arg(long, conflicts_with = "vocab")]
    words: Option<String>,

    /// Vocabulary file, one word per line
    #[arg(long)]
    vocab: Option<PathBuf>,
}

impl PairArgs {
    fn is_empty(&self) -> bool {
        self.voices.is_empty() && self.words.is_none() && self.vocab.is_none()
    }

    /// voices × words; the built-in sample list stands in when no words are given.
    fn pairs(&self) -> Result<Vec<AssetKey>> {
        let voices: Vec<String> = self
            .voices
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if voices.is_empty() {
            bail!("At least one voice is required (--voices)");
        }

        let words = if let Some(list) = &self.words {
            parse_word_list(list)
        } else if let Some(path) = &self.vocab {
            load_vocabulary(path)?
        } else {
            log::info!("No words given, using the {} built-in sample words", SAMPLE_WORDS.len());
            parse_word_list(&SAMPLE_WORDS.join(","))
        };
        if words.is_empty() {
            bail!("Word list is empty");
        }
        Ok(cross_pairs(&voices, &words))
    }
}

// ─── Audit ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Audit stored assets for carrier-phrase contamination")]
struct AuditArgs {
    #[command(flatten)]
    shared: SharedArgs,

    #[command(flatten)]
    pairs: PairArgs,

    #[command(flatten)]
    storage: StorageArgs,

    /// Audit a local mirror laid out as DIR/{voice}/{word}.{ext}
    #[arg(long)]
    local_source: Option<PathBuf>,
}

// ─── Regenerate ──────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Regenerate contaminated assets (dry run unless --execute)")]
struct RegenerateArgs {
    #[command(flatten)]
    shared: SharedArgs,

    #[command(flatten)]
    pairs: PairArgs,

    #[command(flatten)]
    storage: StorageArgs,

    /// Take pairs from an audit's flagged.csv
    #[arg(long, conflicts_with_all = ["voices", "words", "vocab"])]
    from_flagged: Option<PathBuf>,

    /// Categories to take from --from-flagged
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "CARRIER_PRESENT,CARRIER_LIKELY,TOO_SHORT,SILENCE"
    )]
    categories: Vec<String>,

    /// Actually call the TTS provider and upload (default is a dry run)
    #[arg(long, default_value_t = false)]
    execute: bool,

    /// Skip pairs the checkpoint already records as done
    #[arg(long, default_value_t = false, conflicts_with = "fresh")]
    resume: bool,

    /// Ignore an existing checkpoint and start over
    #[arg(long, default_value_t = false)]
    fresh: bool,

    /// Checkpoint file (default: OUTPUT_DIR/checkpoint.json)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Verify by file size only instead of re-classifying
    #[arg(long, default_value_t = false)]
    basic_verify: bool,

    /// Write replacements to DIR/{voice}/{word}.wav instead of uploading
    #[arg(long)]
    local_output: Option<PathBuf>,

    /// Parent directory for per-pair scratch files (default: system temp)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// TTS provider base URL
    #[arg(long, env = "WORDSWEEP_TTS_URL")]
    tts_url: Option<String>,

    /// TTS provider API key
    #[arg(long, env = "WORDSWEEP_TTS_API_KEY", hide_env_values = true)]
    tts_api_key: Option<String>,
}

// ─── Analyze ─────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Print regions and verdicts for local audio files")]
struct AnalyzeArgs {
    /// Audio files to analyze (WAV, MP3, ...)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON config file (omitted fields keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Audit(a) if a.shared.verbose => "debug",
        Command::Regenerate(a) if a.shared.verbose => "debug",
        Command::Analyze(a) if a.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Audit(args) => run_audit(args),
        Command::Regenerate(args) => run_regenerate(args),
        Command::Analyze(args) => run_analyze(args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn credentials(storage: &StorageArgs, tts_url: Option<&String>, tts_api_key: Option<&String>) -> Credentials {
    Credentials {
        tts_url: tts_url.cloned(),
        tts_api_key: tts_api_key.cloned(),
        storage_url: storage.storage_url.clone(),
        storage_key: storage.storage_key.clone(),
    }
}

fn http_store(creds: &Credentials, config: &Config) -> Result<HttpAssetStore> {
    let (url, key) = creds.storage()?;
    Ok(HttpAssetStore::new(url, key, config.storage.clone())?)
}

fn parse_categories(names: &[String]) -> Result<Vec<Category>> {
    names
        .iter()
        .map(|n| n.parse::<Category>().map_err(anyhow::Error::msg))
        .collect()
}

fn run_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string())
}

// ─── Audit runner ────────────────────────────────────────────────

fn run_audit(args: AuditArgs) -> Result<i32> {
    let config = Config::load(args.shared.config.as_deref())?;
    let pairs = args.pairs.pairs()?;

    let store: Box<dyn AssetStore> = match &args.local_source {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("Local source directory not found: {}", dir.display());
            }
            Box::new(LocalAssetStore::new(dir, &config.storage.extension))
        }
        None => Box::new(http_store(&credentials(&args.storage, None, None), &config)?),
    };

    let run_dir = create_run_dir(&args.shared.output_dir, "audit")?;
    println!("Run: {}", run_name(&run_dir));

    let report = Auditor::new(store.as_ref(), &config).run(&pairs);
    let artifacts = write_audit_artifacts(&run_dir, &report)?;

    let totals = &report.totals;
    println!();
    println!("{:<12}{:>7}{:>7}{:>9}{:>9}{:>8}", "voice", "total", "found", "clean%", "contam%", "errors");
    for summary in &report.voices {
        let t = &summary.tally;
        println!(
            "{:<12}{:>7}{:>7}{:>9.1}{:>9.1}{:>8}",
            summary.voice, t.total, t.found, t.clean_pct, t.contaminated_pct, t.errors
        );
    }
    println!(
        "{:<12}{:>7}{:>7}{:>9.1}{:>9.1}{:>8}",
        "ALL", totals.total, totals.found, totals.clean_pct, totals.contaminated_pct, totals.errors
    );
    println!();
    for (category, count) in &totals.by_category {
        println!("  {:<16}{}", category.as_str(), count);
    }
    println!();
    println!(
        "Recommendation: {:?} ({:.1}% contaminated): {}",
        report.recommendation,
        100.0 * totals.contamination_rate(),
        report.recommendation.advice()
    );
    println!("Report:  {}", artifacts.report_json.display());
    println!("Flagged: {} ({} rows)", artifacts.flagged_csv.display(), totals.flagged);
    println!("Voices:  {}", artifacts.voice_summary_csv.display());

    Ok(if report.has_contamination() { EXIT_FINDINGS } else { 0 })
}

// ─── Regenerate runner ───────────────────────────────────────────

fn run_regenerate(args: RegenerateArgs) -> Result<i32> {
    let mut config = Config::load(args.shared.config.as_deref())?;
    if args.local_output.is_some() {
        config.storage.extension = "wav".to_string();
        config.storage.content_type = "audio/wav".to_string();
    }

    let pairs = match &args.from_flagged {
        Some(path) => {
            let categories = parse_categories(&args.categories)?;
            let pairs = read_flagged_csv(path, &categories)?;
            log::info!(
                "Loaded {} pairs from {} ({})",
                pairs.len(),
                path.display(),
                args.categories.join(", ")
            );
            pairs
        }
        None if args.pairs.is_empty() => {
            bail!("Nothing to regenerate: give --from-flagged or --voices with --words/--vocab")
        }
        None => args.pairs.pairs()?,
    };
    if pairs.is_empty() {
        println!("No pairs to regenerate");
        return Ok(0);
    }

    let options = RegenerateOptions {
        checkpoint_path: args
            .checkpoint
            .clone()
            .unwrap_or_else(|| args.shared.output_dir.join("checkpoint.json")),
        resume: args.resume,
        fresh: args.fresh,
        basic_verify: args.basic_verify,
        work_dir: args.work_dir.clone(),
    };
    let creds = credentials(&args.storage, args.tts_url.as_ref(), args.tts_api_key.as_ref());

    if !args.execute {
        let dry_run = plan(&config, &options, &pairs)?;
        println!("{}", dry_run);
        if !config.storage.holds_wav() {
            println!();
            println!(
                "Warning: storage is configured for .{} ({}) but replacements are WAV; --execute will refuse to run.",
                config.storage.extension, config.storage.content_type
            );
        }
        println!();
        println!("Dry run: nothing was synthesized or uploaded. Pass --execute to run.");
        return Ok(0);
    }

    if args.basic_verify {
        log::warn!("Basic verification: replacements are checked by size only");
    }

    let (tts_url, tts_key) = creds.tts()?;
    let synth = HttpSynthesizer::new(tts_url, tts_key, config.tts.clone())?;
    let store: Box<dyn AssetStore> = match &args.local_output {
        Some(dir) => Box::new(LocalAssetStore::new(dir, &config.storage.extension)),
        None => Box::new(http_store(&creds, &config)?),
    };

    let run_dir = create_run_dir(&args.shared.output_dir, "regenerate")?;
    println!("Run: {}", run_name(&run_dir));

    let summary = Regenerator::new(&synth, store.as_ref(), &config, options).run(&pairs)?;
    let (json_path, csv_path) = write_regeneration_artifacts(&run_dir, &summary)?;

    println!();
    println!("Attempted: {}", summary.attempted);
    if summary.skipped > 0 {
        println!("Skipped:   {} (already in checkpoint)", summary.skipped);
    }
    println!("Succeeded: {}", summary.succeeded);
    for (outcome, count) in &summary.failed {
        println!("  {:<20}{}", outcome.as_str(), count);
    }
    println!("Results: {}", json_path.display());
    println!("         {}", csv_path.display());

    Ok(if summary.has_failures() { EXIT_FINDINGS } else { 0 })
}

// ─── Analyze runner ──────────────────────────────────────────────

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = Config::load(args.config.as_deref())?;

    for path in &args.files {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let extension = path.extension().and_then(|e| e.to_str());
        let audio = decode_audio(&bytes, extension)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let analysis = analyze(&audio.samples, audio.sample_rate, &config.analyzer);
        let verdict = classify(&analysis, &config.thresholds);

        println!("{}", path.display());
        println!(
            "  duration {:.3}s, {} Hz, rms {:.1} dBFS",
            analysis.duration,
            analysis.sample_rate,
            analysis.rms_db()
        );
        for (i, region) in analysis.regions.iter().enumerate() {
            println!(
                "  region {}: {:.3}-{:.3}s ({:.3}s)",
                i + 1,
                region.start,
                region.end,
                region.duration()
            );
        }
        println!("  {} ({:.2}): {}", verdict.category, verdict.confidence, verdict.notes);
    }
    Ok(0)
}

use bean_grading::{GradingContext, GradingOutcome};
use certification::{Certificate, CertificationPayload, Identifier, SessionInfo};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cli::{load_grading_config, CliError, GradingRunConfig, ModelSettings};
use color_eyre::eyre::{eyre, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Grade coffee beans from lot photographs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one or more lot images
    Grade {
        /// Images to grade (JPEG, PNG or TIFF)
        #[arg(short, long = "image", required = true, num_args = 1..)]
        images: Vec<PathBuf>,
        /// Color model weights (JSON); also the download cache with --model-url
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Download the model from here when --model does not exist yet
        #[arg(long, requires = "model")]
        model_url: Option<String>,
        /// Grading tunables (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory for reports
        #[arg(short, long, default_value = "grading-output")]
        output: PathBuf,
        /// Per-image time limit in seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },
    /// Grade images listed in a run configuration file
    Run {
        /// Path to the .toml or .json run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Issue a certificate for a graded lot report
    Certify {
        /// `<stem>.report.json` written by `grade`
        #[arg(short, long)]
        report: PathBuf,
        #[arg(long)]
        lot_id: String,
        #[arg(long)]
        session_id: String,
        /// Completion time (RFC 3339); defaults to now
        #[arg(long)]
        completed_at: Option<DateTime<Utc>>,
        #[arg(long)]
        expires_in_days: Option<i64>,
        /// Where to write the certificate; defaults next to the report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a certificate against its payload
    Verify {
        #[arg(short, long)]
        certificate: PathBuf,
        /// Compare against this hash instead of the stored one
        #[arg(long)]
        hash: Option<String>,
    },
    /// Print the JSON schema of the run configuration
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            images,
            model,
            model_url,
            config,
            output,
            timeout_secs,
        } => {
            let mut run = GradingRunConfig::new(
                images.iter().map(|p| p.to_string_lossy().to_string()).collect(),
                output.to_string_lossy().to_string(),
            );
            run.model = ModelSettings {
                path: model.map(|p| p.to_string_lossy().to_string()),
                url: model_url,
            };
            run.timeout_secs = timeout_secs;
            if let Some(config) = config {
                run.grading = load_grading_config(config)?;
            }
            grade_all(run).await?;
        }
        Commands::Run { config } => {
            let run = GradingRunConfig::from_file(&config)?;
            info!("Loaded run configuration from {:?}", config);
            grade_all(run).await?;
        }
        Commands::Certify {
            report,
            lot_id,
            session_id,
            completed_at,
            expires_in_days,
            output,
        } => {
            certify(&report, &lot_id, &session_id, completed_at, expires_in_days, output)?;
        }
        Commands::Verify { certificate, hash } => {
            verify(&certificate, hash.as_deref())?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&GradingRunConfig::schema())?);
        }
    }

    Ok(())
}

async fn build_context(run: &GradingRunConfig) -> Result<GradingContext> {
    let settings = run.model.clone();
    let grading = run.grading.clone();

    // Model loading may download, keep it off the async workers
    let context = tokio::task::spawn_blocking(move || -> Result<GradingContext, CliError> {
        match settings.provider()? {
            Some(provider) => {
                info!("Loading color model: {}", provider.describe());
                Ok(GradingContext::new(grading, provider.as_ref())?)
            }
            None => {
                warn!("No color model configured, grading on shape alone");
                Ok(GradingContext::without_model(grading)?)
            }
        }
    })
    .await??;

    if !context.color_model_available() && run.model.source() != cli::ModelSource::None {
        warn!("Color model unavailable, beans will use the fallback base score");
    }
    Ok(context)
}

async fn grade_all(run: GradingRunConfig) -> Result<()> {
    run.validate()?;
    std::fs::create_dir_all(&run.output_dir)?;

    let context = build_context(&run).await?;
    let timeout = Duration::from_secs(run.timeout_secs);

    let mut tasks = Vec::with_capacity(run.images.len());
    for image in &run.images {
        let context = context.clone();
        let path = PathBuf::from(image);
        let task = tokio::spawn(async move {
            let job_path = path.clone();
            let job = tokio::task::spawn_blocking(move || context.grade_file(&job_path));
            (path, tokio::time::timeout(timeout, job).await)
        });
        tasks.push(task);
    }

    let total = tasks.len();
    let mut failed = 0usize;
    for task in tasks {
        let (path, result) = task.await?;
        match result {
            Ok(Ok(Ok(outcome))) => write_outputs(&run, &path, &outcome)?,
            Ok(Ok(Err(e))) => {
                failed += 1;
                error!("Failed to grade {:?}: {}", path, e);
            }
            Ok(Err(join_error)) => {
                failed += 1;
                error!("Grading task for {:?} panicked: {}", path, join_error);
            }
            Err(_) => {
                failed += 1;
                error!("Grading {:?} exceeded {}s", path, run.timeout_secs);
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {total} images could not be graded"));
    }
    info!("✅ Graded {} images into {}", total, run.output_dir);
    Ok(())
}

fn write_outputs(run: &GradingRunConfig, image: &Path, outcome: &GradingOutcome) -> Result<()> {
    let (report_path, geojson_path) = run.output_paths(image);
    outcome.save_json(&report_path)?;
    outcome.save_geojson(&geojson_path)?;

    info!(
        "{:?}: {} beans, average {:.3}, lot {} ({} without color) -> {:?}",
        image,
        outcome.report.total_beans_analyzed,
        outcome.report.average_quality_score,
        outcome.report.lot_quality,
        outcome.color_fallback_count(),
        report_path
    );
    Ok(())
}

fn certify(
    report_path: &Path,
    lot_id: &str,
    session_id: &str,
    completed_at: Option<DateTime<Utc>>,
    expires_in_days: Option<i64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let outcome = GradingOutcome::from_json_file(report_path)?;
    let session = SessionInfo {
        session_id: session_id.parse::<Identifier>()?,
        coffee_lot_id: lot_id.parse::<Identifier>()?,
        completed_at: completed_at.unwrap_or_else(Utc::now),
        processing_time_seconds: Some(outcome.processing_time_seconds),
    };

    let payload = CertificationPayload::from_report(&outcome.report, &session);
    let certificate = Certificate::issue(payload, expires_in_days)?;

    let output = output.unwrap_or_else(|| report_path.with_extension("certificate.json"));
    std::fs::write(&output, serde_json::to_string_pretty(&certificate)?)?;

    info!("Certificate {} written to {:?}", certificate.certification_id, output);
    println!("certification_id: {}", certificate.certification_id);
    println!("hash: {}", certificate.certification_hash);
    println!("verification_token: {}", certificate.verification_token);
    Ok(())
}

fn verify(certificate_path: &Path, hash: Option<&str>) -> Result<()> {
    let content = std::fs::read_to_string(certificate_path)?;
    let certificate: Certificate = serde_json::from_str(&content)?;
    let now = Utc::now();

    if !certificate.is_valid(now) {
        let reason = if certificate.is_expired(now) { "expired" } else { "revoked" };
        return Err(eyre!(
            "Certificate {} failed verification ({reason})",
            certificate.certification_id
        ));
    }

    let expected = hash.unwrap_or(&certificate.certification_hash);
    if certification::verify_hash(&certificate.payload, expected) {
        println!("✅ {} verified", certificate.certification_id);
        Ok(())
    } else {
        Err(eyre!(
            "Certificate {} failed verification (hash mismatch)",
            certificate.certification_id
        ))
    }
}

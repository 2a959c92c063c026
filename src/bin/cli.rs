//! Nameplate CLI
//!
//! Operator front end for the inference router and the nameplate pipeline:
//! inspect configured backends, run routed completions, and analyze photos
//! straight from disk.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use std::io::Write;

use nameplate_ai::ai::{CapabilityTier, GenerateRequest, InferenceRouter, ProviderDescriptor};
use nameplate_ai::assist::TroubleshootingAssistant;
use nameplate_ai::config::{get_config_path, Settings};
use nameplate_ai::models::VisionExtractionResult;
use nameplate_ai::telemetry;
use nameplate_ai::vision::{AnalyzeOptions, VisionPipeline};

#[derive(Parser)]
#[command(name = "nameplate-cli")]
#[command(about = "Cost-ordered inference routing and nameplate extraction")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long, env = "NAMEPLATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured backends and the provider catalog
    Providers,

    /// Run a text completion through a capability tier
    Generate {
        /// Prompt text
        prompt: String,

        /// Capability tier (simple, moderate, complex, coding, research)
        #[arg(short, long, default_value = "moderate")]
        tier: CapabilityTier,

        /// Print fragments as they arrive
        #[arg(long)]
        stream: bool,

        /// Maximum tokens to generate
        #[arg(long, default_value_t = 1024)]
        max_tokens: u32,
    },

    /// Extract equipment data from a nameplate photo
    Analyze {
        /// Image file (JPEG, PNG or WebP)
        image: PathBuf,

        /// Send the photo even if it looks unreadable
        #[arg(long)]
        skip_quality_check: bool,

        /// Acceptance threshold for this request
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a photo, then ask a troubleshooting question about it
    Ask {
        /// Image file
        image: PathBuf,

        /// Question for the technician assistant
        question: String,

        /// Print the answer as it arrives
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() {
    // before parsing so .env can supply NAMEPLATE_CONFIG
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init_logging(cli.verbose);
    if let Err(e) = dotenv {
        tracing::debug!("No .env file found or error loading: {}", e);
    }

    match run_command(cli).await {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .with_context(|| {
        format!(
            "loading settings from {}",
            cli.config.clone().unwrap_or_else(get_config_path).display()
        )
    })?;

    let router = Arc::new(InferenceRouter::from_settings(&settings)?);

    match cli.command {
        Commands::Providers => print_providers(&router, cli.format)?,

        Commands::Generate {
            prompt,
            tier,
            stream,
            max_tokens,
        } => {
            let request = GenerateRequest::new(prompt, tier).with_max_tokens(max_tokens);
            if stream {
                let fragments = router.generate_stream(&request).await?;
                print_stream(fragments).await?;
            } else {
                let result = router.generate(&request).await?;
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                    OutputFormat::Text => {
                        println!("{}", result.text);
                        eprintln!(
                            "[{}/{} cost {:.6}]",
                            result.backend, result.model, result.cost
                        );
                    }
                }
            }
        }

        Commands::Analyze {
            image,
            skip_quality_check,
            min_confidence,
            json,
        } => {
            let result = analyze(
                &router,
                &settings,
                &image,
                AnalyzeOptions {
                    skip_quality_check,
                    min_confidence,
                },
            )
            .await?;
            if json || cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_extraction(&result);
            }
            if !result.is_success() {
                process::exit(2);
            }
        }

        Commands::Ask {
            image,
            question,
            stream,
        } => {
            let result = analyze(&router, &settings, &image, AnalyzeOptions::default()).await?;
            if let Some(error) = &result.error {
                anyhow::bail!("{}", error.user_message());
            }
            print_extraction(&result);
            println!();

            let assistant = TroubleshootingAssistant::new(router.clone());
            if stream {
                let fragments = assistant.answer_stream(&result, &question).await?;
                print_stream(fragments).await?;
            } else {
                let answer = assistant.answer(&result, &question).await?;
                println!("{}", answer.text);
                eprintln!(
                    "[{}/{} cost {:.6}]",
                    answer.backend, answer.model, answer.cost
                );
            }
        }
    }

    Ok(())
}

async fn analyze(
    router: &Arc<InferenceRouter>,
    settings: &Settings,
    image: &Path,
    options: AnalyzeOptions,
) -> anyhow::Result<VisionExtractionResult> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("reading {}", image.display()))?;
    let pipeline = VisionPipeline::from_settings(router.clone(), settings);
    Ok(pipeline.analyze_image(&bytes, &options).await)
}

async fn print_stream(mut fragments: nameplate_ai::ai::RouterStream) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn print_providers(router: &InferenceRouter, format: OutputFormat) -> anyhow::Result<()> {
    let available = router.available_providers();
    let catalog = router.catalog();

    if format == OutputFormat::Json {
        let mut tiers = serde_json::Map::new();
        for (tier, chain) in catalog.tiers() {
            tiers.insert(tier.to_string(), serde_json::to_value(chain)?);
        }
        let report = serde_json::json!({
            "available": available,
            "vision": catalog.vision_chain(),
            "tiers": tiers,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if available.is_empty() {
        println!("No backends configured. Set GROQ_API_KEY, GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY or DEEPSEEK_API_KEY.");
    } else {
        let names: Vec<String> = available.iter().map(ToString::to_string).collect();
        println!("Configured backends: {}", names.join(", "));
    }

    let row = |d: &ProviderDescriptor| {
        let mark = if available.contains(&d.backend) { "*" } else { " " };
        let limit = if d.supports_vision {
            format!("  max {:.0} MB", d.max_image_mb)
        } else {
            String::new()
        };
        println!(
            "  {} {:<45} in {:.5}/1k  out {:.5}/1k{}",
            mark,
            d.label(),
            d.input_cost_per_1k,
            d.output_cost_per_1k,
            limit
        );
    };

    println!("\nvision:");
    catalog.vision_chain().iter().for_each(row);
    for (tier, chain) in catalog.tiers() {
        println!("\n{}:", tier);
        chain.iter().for_each(row);
    }
    Ok(())
}

fn print_extraction(result: &VisionExtractionResult) {
    if let Some(error) = &result.error {
        println!("{}", error.user_message());
        println!("  ({})", error);
        return;
    }

    println!(
        "Read by {}/{} with confidence {:.2} in {} ms (cost {:.6})",
        result.backend, result.model, result.confidence, result.processing_time_ms, result.cost
    );
    let fields = [
        ("Manufacturer", &result.manufacturer),
        ("Model", &result.model_number),
        ("Serial", &result.serial_number),
        ("Fault code", &result.fault_code),
        ("Type", &result.equipment_type),
        ("Subtype", &result.equipment_subtype),
        ("Condition", &result.condition),
        ("Visible issues", &result.visible_issues),
        ("Voltage", &result.specs.voltage),
        ("Current", &result.specs.current),
        ("Horsepower", &result.specs.horsepower),
        ("Phase", &result.specs.phase),
        ("Frequency", &result.specs.frequency),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<15} {}", label, value);
        }
    }
    for (key, value) in &result.specs.additional {
        println!("  {:<15} {}", key, value);
    }
    if !result.image_issues.is_empty() {
        let issues: Vec<String> = result.image_issues.iter().map(ToString::to_string).collect();
        println!("  Image issues    {}", issues.join(", "));
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "machine-health",
    about = "Electrical health diagnostics for shop-floor machine telemetry",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all analyses on a telemetry CSV and write the JSON health report
    Analyze {
        /// Telemetry CSV (timestamp, machineId, voltage, current, power, powerFactor)
        data_file: PathBuf,

        /// Report output path ("-" for stdout)
        #[arg(long, default_value = "ai_analysis_results.json")]
        output: String,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Machine for voltage anomaly detection
        #[arg(long)]
        voltage_machine: Option<String>,

        /// Machine for degradation trend analysis
        #[arg(long)]
        degradation_machine: Option<String>,

        /// Machine for harmonic analysis
        #[arg(long)]
        harmonics_machine: Option<String>,

        /// Machine for phase imbalance analysis
        #[arg(long)]
        imbalance_machine: Option<String>,
    },

    /// List the machines in a telemetry CSV with their sample counts
    Machines {
        /// Telemetry CSV
        data_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the report can be piped from stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            data_file,
            output,
            config,
            voltage_machine,
            degradation_machine,
            harmonics_machine,
            imbalance_machine,
        } => {
            let mut cfg = match config {
                Some(path) => machine_health::config::AnalysisConfig::load(&path)?,
                None => machine_health::config::AnalysisConfig::load_or_default(),
            };
            if let Some(id) = voltage_machine {
                cfg.machines.voltage = id;
            }
            if let Some(id) = degradation_machine {
                cfg.machines.degradation = id;
            }
            if let Some(id) = harmonics_machine {
                cfg.machines.harmonics = id;
            }
            if let Some(id) = imbalance_machine {
                cfg.machines.imbalance = id;
            }

            let report = machine_health::analyze_file(&data_file, &cfg).await?;

            eprintln!("{}", "=".repeat(60));
            eprintln!(
                "Summary: {} Critical | {} Warnings | Health score {}",
                report.summary.critical, report.summary.warning, report.health_score
            );
            if !report.missing_machines.is_empty() {
                eprintln!("No telemetry for: {}", report.missing_machines.join(", "));
            }
            eprintln!("{}", "=".repeat(60));

            if output == "-" {
                println!("{}", report.to_json_pretty()?);
            } else {
                report.save(std::path::Path::new(&output))?;
            }
        }
        Commands::Machines { data_file } => {
            let cfg = machine_health::config::AnalysisConfig::load_or_default();
            let store = machine_health::telemetry::ingest::load_csv(&data_file, &cfg.ingest)?;
            if store.is_empty() {
                println!("No telemetry found.");
            } else {
                println!("{:<20} | Samples", "Machine");
                println!("{:-<20}-|-{:-<10}", "", "");
                for (id, series) in store.all_series() {
                    println!("{:<20} | {}", id, series.len());
                }
            }
        }
    }

    Ok(())
}

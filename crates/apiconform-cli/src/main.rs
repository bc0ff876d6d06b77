//! apiconform CLI - Conformance testing for versioned REST APIs

mod storage;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use apiconform_core::dryrun::{self, DryRunPlan, FilePlan, PlanContext, Validation, ValidationStatus};
use apiconform_core::report::{FileReport, FileStatus, ReportSink, StepReport, SuiteReport};
use apiconform_core::{Config, ModelRegistry, Selection, VerdictStatus};
use apiconform_runner::{
    ReqwestTransport, SuiteRunner, collect_test_files, expand_file, read_test_file,
};

#[derive(Parser)]
#[command(name = "apiconform")]
#[command(about = "Conformance test harness for versioned REST APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test files against a server
    Run {
        /// Test files or directories (searched recursively)
        #[arg(default_value = "tests")]
        paths: Vec<PathBuf>,

        /// Server base URL (overrides config)
        #[arg(short, long)]
        server: Option<String>,

        /// API version under test (overrides config)
        #[arg(long = "api-version")]
        version: Option<String>,

        /// Run files carrying this tag (repeatable; replaces configured tags)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,

        /// Skip files carrying this tag (repeatable)
        #[arg(short = 'e', long = "exclude-tag")]
        exclude_tags: Vec<String>,

        /// Config file (default: .apiconform.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for saved reports
        #[arg(long, default_value = ".apiconform/reports")]
        output_dir: PathBuf,

        /// Show execution plan without sending requests
        #[arg(long)]
        dry_run: bool,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the report or test-file format
    Schema {
        #[arg(default_value = "report")]
        kind: SchemaKind,
    },
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Report,
    TestFile,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.output);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_tracing(verbose: bool, output: OutputFormat) {
    let level = match (verbose, output) {
        (true, _) => Level::DEBUG,
        (false, OutputFormat::Terminal) => Level::INFO,
        (false, _) => Level::ERROR,
    };
    // RUST_LOG, when set, replaces the level chosen from the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            paths,
            server,
            version,
            tags,
            exclude_tags,
            config,
            output_dir,
            dry_run,
        } => {
            let mut cfg = match config {
                Some(path) => Config::load(&path)?,
                None => Config::load_default()?,
            };
            if let Some(server) = server {
                cfg.server = server;
            }
            if let Some(version) = version {
                cfg.version = version;
            }
            if !tags.is_empty() {
                cfg.include_tags = tags;
            }
            cfg.exclude_tags.extend(exclude_tags);

            let files = collect_test_files(&paths)?;
            if files.is_empty() {
                eprintln!("Error: No test files found. Check the given paths.");
                return Ok(3);
            }

            if dry_run {
                let plan = plan(&cfg, &files);
                match cli.output {
                    OutputFormat::Terminal => println!("{}", plan.to_terminal()),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                    OutputFormat::Silent => {}
                }
                return Ok(i32::from(plan.has_errors()));
            }

            if cli.output == OutputFormat::Terminal {
                eprintln!("Config:");
                eprintln!("  server:  {}", cfg.server);
                eprintln!("  version: {}", cfg.version);
                eprintln!("  tags:    {:?} (exclude {:?})", cfg.include_tags, cfg.exclude_tags);
                eprintln!("  files:   {}", files.len());
                eprintln!();
            }

            let transport = ReqwestTransport::new(cfg.request_timeout())
                .context("failed to build HTTP client")?;
            let runner = SuiteRunner::new(transport, cfg.clone())?;

            let mut report = SuiteReport::new(&cfg.server, &cfg.version);
            report.started = storage::timestamp_iso();
            let summary = {
                let mut progress = Progress {
                    report: &mut report,
                    echo: cli.output == OutputFormat::Terminal,
                };
                runner.run(&files, &mut progress)
            };
            report.finished = storage::timestamp_iso();

            // No file executed → tool error
            let exit_code = if summary.executed() == 0 {
                eprintln!("Error: {}. Check --api-version and tags.", summary.reason());
                3
            } else {
                summary.exit_code()
            };

            match cli.output {
                OutputFormat::Terminal => print_summary(&report, exit_code),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Silent => {}
            }

            match storage::save_report(&output_dir, &report, &cfg) {
                Ok(path) => {
                    if cli.output != OutputFormat::Silent {
                        eprintln!("Report saved: {}", path.display());
                    }
                }
                Err(e) => eprintln!("Warning: failed to save report: {e}"),
            }

            Ok(exit_code)
        }

        Commands::Init => {
            let config_path = ".apiconform.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - server: base URL of the server under test");
            println!("  - version: API version to test");
            println!("  - services.<name>.headers: auth tokens, content negotiation");
            println!("  - services.<name>.models: schema documents per API version");
            Ok(0)
        }

        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Report => apiconform_core::report::generate_schema(),
                SchemaKind::TestFile => apiconform_core::report::generate_test_file_schema(),
            };
            println!("{schema}");
            Ok(0)
        }
    }
}

/// Forwards results to the suite report, echoing progress to the terminal.
struct Progress<'a> {
    report: &'a mut SuiteReport,
    echo: bool,
}

impl ReportSink for Progress<'_> {
    fn step_finished(&mut self, file: &str, step: &StepReport) {
        self.report.step_finished(file, step);
        if self.echo {
            let icon = if step.is_pass() { "PASS" } else { "FAIL" };
            println!("  [{icon}] {} ({})", step.operation, step.name);
            if let Some(error) = &step.error {
                println!("         {error}");
            }
        }
    }

    fn file_finished(&mut self, file: &FileReport) {
        self.report.file_finished(file);
        if self.echo {
            match file.status {
                FileStatus::Skipped => println!(
                    "{} skipped: {}",
                    file.path,
                    file.skip_reason.as_deref().unwrap_or_default()
                ),
                status => println!("{} {status}\n", file.path),
            }
        }
    }
}

fn print_summary(report: &SuiteReport, exit_code: i32) {
    let summary = &report.summary;
    let icon = if summary.status() == VerdictStatus::Pass {
        "PASS"
    } else {
        "FAIL"
    };
    println!("\n{icon}: {}", summary.reason());
    println!(
        "  Files: {} total, {} passed, {} failed, {} skipped",
        summary.total,
        summary.passed.len(),
        summary.failed.len(),
        summary.skipped.len()
    );
    println!("  Exit code: {exit_code}");

    let failed: Vec<&FileReport> = report
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!("\nFailures ({}):", failed.len());
        for file in failed {
            match file.failure_kind {
                Some(kind) => println!("  [{kind}] {} ({})", file.path, kind.description()),
                None => println!("  [unknown] {}", file.path),
            }
            if let Some(error) = &file.error {
                println!("         {error}");
                if let Some(detail) = &error.detail {
                    println!("         {detail}");
                }
            }
        }
    }
}

/// Build the dry-run plan: config checks plus a per-file plan.
fn plan(cfg: &Config, files: &[PathBuf]) -> DryRunPlan {
    let mut plan = DryRunPlan::new(dryrun::validate_config(cfg));
    let selection = Selection::from_config(cfg);

    let mut registries = BTreeMap::new();
    for (name, service) in &cfg.services {
        match ModelRegistry::from_service(service, &cfg.base_dir) {
            Ok(registry) => {
                registries.insert(name.clone(), registry);
            }
            Err(e) => plan.validations.push(Validation {
                check: "models".into(),
                status: ValidationStatus::Error,
                message: format!("{name}: {e}"),
            }),
        }
    }

    for path in files {
        let display = path.display().to_string();
        let loaded = read_test_file(path).and_then(|file| {
            // Skipped files are planned without expanding their templates
            if selection.check(&file).is_err() {
                return Ok((file, Vec::new()));
            }
            expand_file(path, file).map(|loaded| (loaded.file, loaded.steps))
        });
        match loaded {
            Ok((file, steps)) => {
                let service = &file.service;
                let ctx = PlanContext {
                    selection: &selection,
                    service: cfg.services.get(service),
                    registry: registries.get(service),
                };
                plan.push(FilePlan::build(&display, &file, &steps, ctx));
            }
            Err(e) => plan.validations.push(Validation {
                check: "load".into(),
                status: ValidationStatus::Error,
                message: e.to_string(),
            }),
        }
    }
    plan
}

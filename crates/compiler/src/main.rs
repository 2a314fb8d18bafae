//! C-Next Transpiler CLI
//!
//! Command-line interface for translating .cnx projects to C/C++ and for
//! cleaning previously generated output trees.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use cnextc::config::ProjectConfig;
use cnextc::includes::find_project_root;
use cnextc::paths::OutputLang;
use cnextc::pipeline::{Pipeline, ProjectOptions};
use cnextc::target::KNOWN_TARGETS;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "cnextc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C-Next transpiler - translate .cnx sources to safety-checked C", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate .cnx files or directories to C (or C++)
    Build {
        /// Input .cnx files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for generated .c/.cpp files
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Output directory for generated headers (defaults to --out)
        #[arg(long = "header-out", value_name = "DIR")]
        header_out: Option<PathBuf>,

        /// Extra include search directory (repeatable)
        #[arg(long = "include", value_name = "DIR")]
        includes: Vec<PathBuf>,

        /// Emit C++ instead of C
        #[arg(long)]
        cpp: bool,

        /// Default target for atomic lowering (see `cnextc targets`)
        #[arg(long)]
        target: Option<String>,

        /// Keep translating remaining files after one file fails
        #[arg(long)]
        keep_going: bool,
    },

    /// Remove generated files from the output trees for the given inputs
    Clean {
        /// Input .cnx files or directories the build was run with
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory the build wrote to
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Header output directory the build wrote to
        #[arg(long = "header-out", value_name = "DIR")]
        header_out: Option<PathBuf>,
    },

    /// List known targets and their capabilities
    Targets,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            inputs,
            out,
            header_out,
            includes,
            cpp,
            target,
            keep_going,
        } => run_build(inputs, out, header_out, includes, cpp, target, keep_going),
        Commands::Clean {
            inputs,
            out,
            header_out,
        } => run_clean(inputs, out, header_out),
        Commands::Targets => run_targets(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cnextc", &mut io::stdout());
        }
    }
}

/// Build options resolve as CLI flags over project config over defaults
fn resolve_options(
    inputs: Vec<PathBuf>,
    out: Option<PathBuf>,
    header_out: Option<PathBuf>,
    includes: Vec<PathBuf>,
    cpp: bool,
    target: Option<String>,
    keep_going: bool,
) -> ProjectOptions {
    let config = inputs
        .first()
        .and_then(|input| find_project_root(input))
        .map(|root| ProjectConfig::load(&root))
        .transpose()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        })
        .unwrap_or_default();

    let out_dir = out
        .or_else(|| config.out_dir.clone())
        .unwrap_or_else(|| PathBuf::from("build"));

    let mut options = ProjectOptions::new(inputs, out_dir);
    options.header_out_dir = header_out;
    options.include_dirs = includes;
    options.target = target;
    options.continue_on_error = keep_going;
    if cpp {
        options.lang = OutputLang::Cpp;
    }
    options.apply_config(&config);
    options
}

#[allow(clippy::too_many_arguments)]
fn run_build(
    inputs: Vec<PathBuf>,
    out: Option<PathBuf>,
    header_out: Option<PathBuf>,
    includes: Vec<PathBuf>,
    cpp: bool,
    target: Option<String>,
    keep_going: bool,
) {
    let options = resolve_options(inputs, out, header_out, includes, cpp, target, keep_going);
    let mut pipeline = Pipeline::new(options);
    match pipeline.run() {
        Ok(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("{}", diagnostic);
            }
            for emitted in &report.emitted {
                match &emitted.header_path {
                    Some(header) => println!(
                        "{} -> {} + {}",
                        emitted.source.display(),
                        emitted.code_path.display(),
                        header.display()
                    ),
                    None => println!(
                        "{} -> {}",
                        emitted.source.display(),
                        emitted.code_path.display()
                    ),
                }
            }
        }
        Err(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("{}", diagnostic);
            }
            eprintln!(
                "error: translation failed with {} error(s)",
                report
                    .diagnostics
                    .iter()
                    .filter(|d| d.is_error())
                    .count()
            );
            process::exit(1);
        }
    }
}

fn run_clean(inputs: Vec<PathBuf>, out: Option<PathBuf>, header_out: Option<PathBuf>) {
    let options = resolve_options(inputs, out, header_out, Vec::new(), false, None, false);
    let pipeline = Pipeline::new(options);
    match pipeline.clean() {
        Ok(removed) => {
            for path in &removed {
                println!("removed {}", path.display());
            }
            println!("{} file(s) removed", removed.len());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_targets() {
    println!("{:<16} exclusive load/store", "TARGET");
    for (name, caps) in KNOWN_TARGETS {
        println!(
            "{:<16} {}",
            name,
            if caps.has_ldrex_strex { "yes" } else { "no" }
        );
    }
}

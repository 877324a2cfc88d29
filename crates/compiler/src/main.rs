//! Mica Compiler CLI
//!
//! Command-line interface for the Mica front-end: preprocess C sources and
//! inspect scanner output.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use micac::{preprocess_file, CompilerConfig};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "micac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mica compiler front-end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess a C file and print the resolved token stream
    Expand {
        /// Input .c or .h source file
        input: PathBuf,

        /// Include search directory (repeatable, searched in order)
        #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /// Path to a TOML project configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Dump the scanned token stream of a file (before resolution)
    Tokens {
        /// Input .c or .h source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Expand {
            input,
            include_dirs,
            config,
        } => {
            let base = match config {
                Some(path) => match CompilerConfig::from_project_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(1);
                    }
                },
                None => CompilerConfig::new(),
            };
            let config = base.with_include_dirs(include_dirs);

            match preprocess_file(&input, &config) {
                Ok(unit) => {
                    for diagnostic in unit.comp.sink.diagnostics() {
                        eprintln!("{}", diagnostic);
                    }
                    println!("{}", unit.render());
                }
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }

        Commands::Tokens { input } => {
            let source = match std::fs::read_to_string(&input) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Error: failed to read {}: {}", input.display(), e);
                    process::exit(1);
                }
            };

            let mut arena = micac::TokenArena::new();
            let file = micac::FileId::new(0, micac::FileKind::Source);
            match micac::scanner::scan(&source, file, &mut arena) {
                Ok(stream) => {
                    for id in stream.iter() {
                        println!("{:?}", arena.kind(id));
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
}

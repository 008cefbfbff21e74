use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use kiln_build::KilnError;
use kiln_config::{HeadlessMode, Preset};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod logging;
mod report;

/// Fetch, patch, build and install vendored native source trees.
///
/// kiln reads kiln.toml, downloads the upstream source archive, finds each
/// component directory however the release lays it out, rewrites Makefiles
/// for the host toolchain, builds components in dependency order and
/// installs the resulting executables.
///
/// EXAMPLES:
///     kiln init --preset xfoil     Write a starter kiln.toml
///     kiln plan                    Show build order and patch rules
///     kiln run                     Fetch, patch, build and install
///     kiln run --headless always   Build without a display stack
///     kiln which xfoil             Locate the installed executable
///
/// EXIT CODES:
///     0 success, 1 config or usage, 2 fetch, 3 layout, 4 patch I/O,
///     5 build, 6 install, 7 extract, 8 concurrent run
///
/// ENVIRONMENT VARIABLES:
///     KILN_WORK_DIR, KILN_INSTALL_DIR, KILN_BUILD_TOOL, KILN_TIMEOUT,
///     KILN_HEADLESS   Override the matching kiln.toml settings
///     KILN_JSON       Set to '1' for JSON output by default
///     RUST_LOG        Log filter (overrides -v and -q)
///     NO_COLOR        Set to disable colored output
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to kiln.toml (default: search upward from the current directory)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, patch, build and install
    ///
    /// EXAMPLES:
    ///     kiln run                          Full run
    ///     kiln run --dry-run                Show which files would be patched
    ///     kiln run --install-dir ~/.local/bin
    ///     kiln run --clean --timeout 600    Re-extract, 10 minute build limit
    Run {
        /// Working directory for the archive and extracted tree
        #[arg(long, value_name = "DIR")]
        work_dir: Option<PathBuf>,
        /// Where executables are installed
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
        /// Headless substitution policy (auto, always, never)
        #[arg(long, value_name = "MODE")]
        headless: Option<HeadlessMode>,
        /// Per-subprocess timeout in seconds (0 disables)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Remove the extracted tree before fetching
        #[arg(long)]
        clean: bool,
        /// Stop after reporting what patching would change
        #[arg(long)]
        dry_run: bool,
        /// Build but do not install
        #[arg(long)]
        no_install: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download and extract the source archive
    Fetch {
        #[arg(long, value_name = "DIR")]
        work_dir: Option<PathBuf>,
        /// Remove the extracted tree first
        #[arg(long)]
        clean: bool,
        #[arg(long)]
        json: bool,
    },

    /// Locate components and patch build files
    Patch {
        #[arg(long, value_name = "DIR")]
        work_dir: Option<PathBuf>,
        /// List the files that would change without writing them
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved build plan without side effects
    Plan {
        #[arg(long, value_name = "DIR")]
        work_dir: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
        #[arg(long, value_name = "MODE")]
        headless: Option<HeadlessMode>,
        #[arg(long)]
        json: bool,
    },

    /// Write a starter kiln.toml
    ///
    /// EXAMPLES:
    ///     kiln init                    XFOIL recipe in the current directory
    ///     kiln init --preset minimal   Single-component skeleton
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Starter configuration (xfoil, minimal)
        #[arg(long, short = 'p', default_value = "xfoil")]
        preset: Preset,
        /// Overwrite an existing kiln.toml
        #[arg(long)]
        force: bool,
    },

    /// Print the path of an installed executable
    ///
    /// Checks <NAME>_PATH (e.g. XFOIL_PATH), then the install dir, then PATH.
    Which {
        /// Component or executable name
        name: String,
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Run { json, .. }
            | Self::Fetch { json, .. }
            | Self::Patch { json, .. }
            | Self::Plan { json, .. }
            | Self::Which { json, .. } => *json,
            Self::Init { .. } | Self::Completions { .. } => false,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Usage errors share the configuration exit code
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let cli_config = config::Config::from_env();
    cli_config.apply_color();
    logging::init_logging(cli.verbose, cli.quiet, !cli_config.no_color);

    let json = cli.command.json() || cli_config.default_json;
    match dispatch(cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kiln = err.chain().find_map(|e| e.downcast_ref::<KilnError>());
            let code = kiln.map(KilnError::exit_code).unwrap_or(1);
            if json {
                report::print_error_json(&err, kiln, code);
            } else {
                report::print_error(&err, kiln);
            }
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn dispatch(cli: Cli, json: bool) -> Result<()> {
    let config_path = cli.config;

    match cli.command {
        Commands::Run {
            work_dir,
            install_dir,
            headless,
            timeout,
            clean,
            dry_run,
            no_install,
            ..
        } => {
            let args = commands::run::RunArgs {
                config_path,
                work_dir,
                install_dir,
                headless,
                timeout,
                clean,
                dry_run,
                no_install,
                json,
            };
            commands::run::run(args)?;
        }
        Commands::Fetch {
            work_dir, clean, ..
        } => {
            let args = commands::fetch::FetchArgs {
                config_path,
                work_dir,
                clean,
                json,
            };
            commands::fetch::run(args)?;
        }
        Commands::Patch {
            work_dir, dry_run, ..
        } => {
            let args = commands::patch::PatchArgs {
                config_path,
                work_dir,
                dry_run,
                json,
            };
            commands::patch::run(args)?;
        }
        Commands::Plan {
            work_dir,
            install_dir,
            headless,
            ..
        } => {
            let args = commands::plan::PlanArgs {
                config_path,
                work_dir,
                install_dir,
                headless,
                json,
            };
            commands::plan::run(args)?;
        }
        Commands::Init {
            path,
            preset,
            force,
        } => {
            let args = commands::init::InitArgs {
                path,
                preset,
                force,
            };
            commands::init::run(args)?;
        }
        Commands::Which {
            name, install_dir, ..
        } => {
            let args = commands::which::WhichArgs {
                config_path,
                name,
                install_dir,
                json,
            };
            commands::which::run(args)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}

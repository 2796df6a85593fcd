use passbuild::cli::commands::{CliArgs, Commands};
use passbuild::cli::handlers::{handle_build, handle_clean, handle_list};
use passbuild::util::logging::{config_from_env, init_logging, parse_level};
use passbuild::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("passbuild v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Build(build_args) => handle_build(build_args, args.quiet).await,
        Commands::List(list_args) => handle_list(list_args),
        Commands::Clean(clean_args) => handle_clean(clean_args, args.quiet),
    };

    std::process::exit(exit_code);
}

/// `--log-level`, then `-v`/`-q`, then PASSBUILD_LOG_LEVEL
fn init_logging_from_args(args: &CliArgs) {
    let mut config = config_from_env();
    if let Some(level) = &args.log_level {
        config.level = parse_level(level);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}

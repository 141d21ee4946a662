use clap::Parser;

use stepmigrate::cli::{self, io::write_error, Cli};
use stepmigrate::logging::{init_logging, LoggingConfig};

fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig::default()
        .with_level(cli.log_level.clone())
        .with_json(cli.log_json)
        .with_target(cli.log_target);
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(err) = cli::run(cli) {
        tracing::error!(code = err.code(), "{}", err.message());
        if write_error(err.code(), err.message()).is_err() {
            eprintln!("{}", err);
        }
        std::process::exit(err.exit_code());
    }
}

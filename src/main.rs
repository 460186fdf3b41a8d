use clap::Parser;
use desktop_cleaner::cli::{self, Cli};
use desktop_cleaner::config::CleanerConfig;
use desktop_cleaner::logging;
use desktop_cleaner::output::OutputFormatter;
use desktop_cleaner::paths::AppPaths;
use std::path::Path;
use std::process;
use tracing::warn;

fn main() {
    let cli = Cli::parse();

    let config = match CleanerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            process::exit(1);
        }
    };
    logging::init(&config.logger);

    let paths = AppPaths::discover().with_cache_dir(Path::new(&config.cache_dir));
    if let Err(e) = CleanerConfig::write_default_if_missing(&paths.config_file) {
        warn!("Could not write default configuration: {e}");
    }

    if let Err(e) = cli::run(cli, &config, &paths) {
        OutputFormatter::error(&e.to_string());
        process::exit(1);
    }
}

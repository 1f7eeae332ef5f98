// SPDX-License-Identifier: GPL-2.0-or-later

mod app;
mod demo_source;
mod driver;

use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG_PATH: &str = "./configs/omaf_authord.json";

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("failed to parse arguments: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = app::run(&args.config) {
        eprintln!("failed to run app: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[derive(Debug)]
pub struct Args {
    pub config: PathBuf,
}

pub fn parse_args() -> Result<Args, pico_args::Error> {
    let mut raw = pico_args::Arguments::from_env();

    if raw.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let config = raw
        .opt_value_from_str("--config")?
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let leftover = raw.finish();
    if !leftover.is_empty() {
        eprintln!("unrecognized arguments: {leftover:?}");
    }

    Ok(Args { config })
}

const HELP: &str = "\
omaf_authord

USAGE:
    omaf_authord [--config <PATH>]

OPTIONS:
    --config <PATH>    Path to the pipeline config file [default: ./configs/omaf_authord.json]
    -h, --help         Print this help
";

use clap::{Arg, ArgAction, Command};
use tracing::{error, info};

use rbuild::build_params::BuildParameters;
use rbuild::config::DEFAULT_PARAMS_FILE;
use rbuild::logging::{self, LogLevel};
use rbuild::provision;
use rbuild::remote::{DryRunRunner, SshRunner, SshTarget};

// Remote step failures never abort the run; a bad parameter file is propagated
// out of main. With --strict a run that had failed steps still completes, then
// exits 1.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("rbuild-provision")
        .about("Wipe, re-clone and build the image repository on a remote build host")
        .arg(
            Arg::new("params")
                .short('p')
                .long("params")
                .help("Path to the key=value build parameter file")
                .default_value(DEFAULT_PARAMS_FILE),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print the remote commands instead of running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Exit with status 1 if any remote command failed")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log at DEBUG level regardless of LOG_LEVEL")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let params_path = matches
        .get_one::<String>("params")
        .map(String::as_str)
        .unwrap_or(DEFAULT_PARAMS_FILE);

    let params = BuildParameters::load(params_path)?;

    let level = if matches.get_flag("verbose") {
        LogLevel::Debug
    } else {
        params.log_level
    };
    logging::init(level);
    info!("loaded build parameters from {}", params_path);

    for line in params.summary() {
        println!("{}", line);
    }

    let target = SshTarget::from_params(&params);
    let report = if matches.get_flag("dry-run") {
        provision::run(&params, &DryRunRunner::new(target)).await
    } else {
        provision::run(&params, &SshRunner::new(target)).await
    };

    let code = report.exit_code(matches.get_flag("strict"));
    if code != 0 {
        error!("{} remote command(s) failed", report.failed_steps());
        std::process::exit(code);
    }

    Ok(())
}

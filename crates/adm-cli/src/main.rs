use adm_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    let data_dir = adm_core::config::AdmConfig::from_env().data_dir;
    if logging::init_logging(&data_dir).is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("adm error: {err:#}");
        std::process::exit(1);
    }
}

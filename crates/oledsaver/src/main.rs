mod cli;
mod report;
mod run;

use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::parse();
    run::initialise_tracing();

    match run::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report::report_fatal(&err);
            ExitCode::FAILURE
        }
    }
}

use std::process::ExitCode;

fn main() -> ExitCode {
    wfh_cli::run()
}

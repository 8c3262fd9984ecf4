use std::process::ExitCode;

fn main() -> ExitCode {
    casedesk_cli::run()
}

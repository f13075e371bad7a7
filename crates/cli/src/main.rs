use std::process::ExitCode;

fn main() -> ExitCode {
    outdial_cli::run()
}

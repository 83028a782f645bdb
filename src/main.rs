//! gh1000 binary entry point.

use std::process::ExitCode;

use gh1000::ui::output;

fn main() -> ExitCode {
    match gh1000::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(output::format_error_chain(&err));
            ExitCode::FAILURE
        }
    }
}

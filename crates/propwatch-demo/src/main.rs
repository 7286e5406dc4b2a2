#![forbid(unsafe_code)]

fn main() {
    if let Err(error) = propwatch_demo::run_from_env() {
        eprintln!("{error}");
        if matches!(error, propwatch_demo::error::DemoError::InvalidArgument { .. }) {
            eprintln!("Run with --help for usage information.");
        }
        std::process::exit(error.exit_code());
    }
}

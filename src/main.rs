use std::process::ExitCode;

fn main() -> ExitCode {
    match ner_enricher_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ner-enricher failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

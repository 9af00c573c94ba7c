//! repolens: a deterministic, content-addressed artifact pipeline and
//! retrieval index for repositories.

fn main() {
    if let Err(err) = repolens::cli::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

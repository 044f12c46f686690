//! cuantizar CLI - per-tensor mixed-precision quantization for GGML Whisper models
//!
//! ```text
//! cuantizar [--tensor-type PATTERN=TYPE]... INPUT OUTPUT DEFAULT_TYPE
//! ```

fn main() {
    // Diagnostics only; report lines go to stdout regardless of RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(cuantizar::cli::run(std::env::args_os()));
}

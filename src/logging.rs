//! Inicialização do subscriber `tracing`.
//!
//! `RUST_LOG` tem precedência; sem ele o nível é `info`, ou `debug` com
//! `--verbose`. Chamar mais de uma vez é inofensivo.

use tracing_subscriber::EnvFilter;

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "presswright=debug,info"
    } else {
        "info"
    }
}

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // Falha apenas se outro subscriber global já estiver instalado.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

use tracing_subscriber::{fmt, EnvFilter};

use crate::Result;

/// Initialize tracing for a courier binary.
///
/// Default: info for our crates. Can be overridden with `RUST_LOG`.
/// Calling this more than once is harmless (the first subscriber wins).
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,courier=info,courier_core=info,courier_http=info,courier_bridge=info,{service_name}=info"
        ))
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();

    Ok(())
}

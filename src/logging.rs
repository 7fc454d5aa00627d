use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "CHATCTX_LOG";

fn filter_for(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("chatctx=debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

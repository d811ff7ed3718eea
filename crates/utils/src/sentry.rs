use sentry_tracing::{EventFilter, SentryLayer};
use tracing::Level;
use tracing_subscriber::registry::LookupSpan;

/// Initialise error reporting when a DSN is configured. Keep the guard alive for the
/// lifetime of the process.
pub fn init_once(dsn: Option<&str>, environment: &str) -> Option<sentry::ClientInitGuard> {
    let dsn = dsn.filter(|d| !d.trim().is_empty())?;
    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment.to_string().into()),
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Forward `error!` events to Sentry and keep `warn!` as breadcrumbs.
pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        Level::ERROR => EventFilter::Event,
        Level::WARN => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    })
}

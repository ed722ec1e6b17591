use std::env;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the tracing subscriber, plus Sentry when `SENTRY_DSN` is set.
///
/// The returned guard flushes pending Sentry events on drop; keep it alive for the whole process.
pub fn init_tracing(component: &str) -> Option<sentry::ClientInitGuard> {
    let guard = env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: env::var("SENTRY_ENVIRONMENT").ok().map(Into::into),
                    attach_stacktrace: true,
                    ..Default::default()
                },
            ))
        });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(guard.as_ref().map(|_| sentry_tracing::layer()))
        .init();

    if guard.is_some() {
        sentry::configure_scope(|scope| scope.set_tag("component", component));
        tracing::info!("Sentry error reporting enabled");
    }

    guard
}

use std::future::Future;

use eyre::{Result, WrapErr};
use tenant_limiter::TenantLimiter;
use tokio::net::TcpListener;
use user_pipeline::enricher::{HttpEnricher, SimulatedEnricher};
use user_pipeline::pipeline::Pipeline;

use crate::config::Config;
use crate::router;

/// Build the pipeline against the configured lookup service, or a simulated
/// one when no url is set.
pub fn build_pipeline(config: &Config) -> Result<Pipeline> {
    match &config.enricher_url {
        Some(url) => {
            let base_url = reqwest::Url::parse(url)
                .wrap_err_with(|| format!("invalid ENRICHER_URL {}", url))?;
            let enricher = HttpEnricher::new(base_url, config.enricher_timeout.0)
                .wrap_err("failed to construct http enricher")?;
            tracing::info!("enriching users from {}", url);
            Ok(Pipeline::new(enricher))
        }
        None => {
            tracing::info!("no ENRICHER_URL set, simulating lookups");
            Ok(Pipeline::new(SimulatedEnricher::new(
                config.simulated_latency.0,
            )))
        }
    }
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pipeline = build_pipeline(&config)?;

    let limiter = TenantLimiter::new(
        config.tenant_limits.tenant_limit,
        config.tenant_limits.tenant_window.0,
    );

    let cleaner = {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.clean_state().await })
    };
    let reporter = {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.report_metrics().await })
    };

    let state = router::State {
        pipeline,
        default_concurrency: config.default_concurrency,
        max_concurrency: config.max_concurrency,
    };
    let app = router::router(state, limiter, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr()?);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    cleaner.abort();
    reporter.abort();

    served.wrap_err("http server failed")
}

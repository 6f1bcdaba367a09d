//! Generate static files

use anyhow::Result;
use std::time::Instant;

use crate::client::ContentClient;
use crate::generator::{GenerateReport, Generator};
use crate::Blog;

/// Generate the static site from the configured repository
pub async fn run(blog: &Blog, force: bool) -> Result<()> {
    let client = blog.client()?;
    run_with_client(blog, client.as_ref(), force).await?;
    Ok(())
}

pub async fn run_with_client(
    blog: &Blog,
    client: &dyn ContentClient,
    force: bool,
) -> Result<GenerateReport> {
    let start = Instant::now();

    let report = Generator::new(blog, client)?.generate(force).await?;

    tracing::info!(
        "Generated {} listing page(s) and {} post(s) ({} fresh, {} missing, {} removed) in {:.2}s",
        report.listing_pages,
        report.posts_written,
        report.posts_fresh,
        report.posts_missing,
        report.posts_removed,
        start.elapsed().as_secs_f64()
    );

    Ok(report)
}

/// Regenerate every revalidation period until interrupted
pub async fn watch(blog: &Blog) -> Result<()> {
    let client = blog.client()?;
    let period = blog.config.revalidate();
    tracing::info!(
        "Regenerating every {}s. Press Ctrl+C to stop.",
        period.as_secs()
    );

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; the caller already generated
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tracing::info!("Revalidation period elapsed, regenerating...");
                if let Err(e) = run_with_client(blog, client.as_ref(), false).await {
                    tracing::error!("Generation failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping");
                break;
            }
        }
    }

    Ok(())
}

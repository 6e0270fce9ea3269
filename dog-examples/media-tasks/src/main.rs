use anyhow::Result;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_tasks::background::ResizeRequest;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let system = media_tasks::build()?;
    for warning in system.manager().warnings() {
        tracing::warn!(%warning, "Configuration fallback");
    }

    let mut jobs = Vec::new();
    for (i, width) in [640u32, 1280, 320, 0, 800].into_iter().enumerate() {
        let request = ResizeRequest {
            image_id: format!("img-{i}"),
            width,
            height: width * 9 / 16,
        };
        jobs.push(system.enqueue("resize-image", serde_json::to_value(request)?).await?);
    }
    jobs.push(system.enqueue("purge-thumbnails", json!({ "prefix": "thumbs/2024/" })).await?);
    jobs.push(system.enqueue("send-email", json!({ "to": "ops@example.com" })).await?);
    jobs.push(system.enqueue("send-email", json!({})).await?);
    jobs.push(system.enqueue("daily-digest", json!({})).await?);

    if !system.manager().settings().start_processing {
        println!("[media-tasks] START_PROCESSING is off, {} jobs left queued", jobs.len());
        return Ok(());
    }

    for job in &jobs {
        let job = system.wait_for(&job.id).await?;
        println!(
            "[media-tasks] job {} ({}) on {}: {}{}",
            job.id,
            job.task_name,
            job.queue,
            job.state.name(),
            job.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default()
        );
    }

    println!(
        "[media-tasks] resized {} images, sent {} emails",
        system.images.resized(),
        system.notifications.sent()
    );
    Ok(())
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use storefront_core::config::Config;
use storefront_core::kv;
use storefront_core::publish::{PublishStatus, CONTENT_PUBLISH};

use crate::output::{print_json, print_table};

pub fn run(config: &Config, json: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(async {
        let store = kv::open(&config.store)?;
        PublishStatus::read(store.as_ref(), CONTENT_PUBLISH).await
    })?;

    if json {
        print_json(&status)?;
        return Ok(());
    }

    let pending = if status.debounce.is_pending() {
        format_millis(status.debounce.scheduled_at_millis)
    } else {
        "none".to_string()
    };
    let runner = match &status.lease {
        Some(lease) => format!(
            "{} (since {})",
            lease.runner_id,
            format_millis(lease.acquired_at_millis)
        ),
        None => "none".to_string(),
    };
    print_table(
        &["KIND", "PENDING PUBLISH", "RUNNER"],
        vec![vec![status.kind.clone(), pending, runner]],
    );
    Ok(())
}

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

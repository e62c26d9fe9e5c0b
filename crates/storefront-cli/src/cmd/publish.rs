use anyhow::{bail, Result};
use storefront_core::config::Config;
use storefront_core::publish::{ExternalAction, HttpPublishAction, StepOutcome};

use crate::output::{print_json, print_table};

pub fn run(config: &Config, json: bool) -> Result<()> {
    let Some(action) = HttpPublishAction::from_config(&config.publish)? else {
        if json {
            print_json(&serde_json::json!({ "published": false, "reason": "no deploy hook configured" }))?;
        } else {
            println!("Publishing is not configured (set PAGES_DEPLOY_HOOK_URL).");
        }
        return Ok(());
    };

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(action.execute())?;

    if json {
        print_json(&report)?;
    } else {
        print_table(
            &["STEP", "RESULT"],
            vec![
                vec!["deploy hook".into(), describe(&report.hook)],
                vec!["cache purge".into(), describe(&report.purge)],
            ],
        );
    }

    if let StepOutcome::Failed(e) = &report.hook {
        bail!("deploy hook failed: {e}");
    }
    if let StepOutcome::Failed(e) = &report.purge {
        bail!("cache purge failed: {e}");
    }
    Ok(())
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Done => "done".into(),
        StepOutcome::Skipped => "skipped".into(),
        StepOutcome::Failed(e) => format!("failed: {e}"),
    }
}

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use storefront_core::catalog::{CatalogStore, Table};
use storefront_core::config::Config;
use storefront_core::kv;

use crate::output::{print_json, print_table};

#[derive(Serialize)]
struct Pulled {
    table: String,
    rows: Option<usize>,
    path: Option<String>,
    error: Option<String>,
}

pub fn run(config: &Config, out: &Path, json: bool) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("cannot create output directory {}", out.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(async {
        let catalog = CatalogStore::new(kv::open(&config.store)?);
        let mut results = Vec::new();
        for &table in Table::all() {
            results.push(pull_table(&catalog, table, out).await);
        }
        Ok::<_, anyhow::Error>(results)
    })?;

    if json {
        print_json(&results)?;
    } else {
        let rows = results
            .iter()
            .map(|r| {
                vec![
                    r.table.clone(),
                    r.rows.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    r.path
                        .clone()
                        .or_else(|| r.error.as_ref().map(|e| format!("error: {e}")))
                        .unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["TABLE", "ROWS", "FILE"], rows);
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} tables failed to export", results.len());
    }
    Ok(())
}

async fn pull_table(catalog: &CatalogStore, table: Table, out: &Path) -> Pulled {
    let path = out.join(format!("{table}.json"));
    let written = async {
        let rows = catalog.load(table).await?;
        let body = serde_json::to_string_pretty(&rows)?;
        std::fs::write(&path, body)?;
        Ok::<_, anyhow::Error>(rows.len())
    }
    .await;

    match written {
        Ok(n) => Pulled {
            table: table.to_string(),
            rows: Some(n),
            path: Some(path.display().to_string()),
            error: None,
        },
        Err(e) => {
            tracing::warn!(table = %table, error = %e, "failed to export table");
            Pulled {
                table: table.to_string(),
                rows: None,
                path: None,
                error: Some(format!("{e:#}")),
            }
        }
    }
}

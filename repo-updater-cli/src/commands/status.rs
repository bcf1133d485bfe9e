//! `repo-updater status`: catalog contents per origin.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use repo_updater_sync::CatalogStore;

use super::{block_on, home_dir, load_config};

/// Arguments for `repo-updater status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OriginStatus {
    origin: String,
    registered: bool,
    active: usize,
    tombstoned: usize,
}

#[derive(Serialize)]
struct StatusReportJson {
    catalog: String,
    interval_secs: u64,
    origins: Vec<OriginStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "origin")]
    origin: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "active")]
    active: usize,
    #[tabled(rename = "tombstoned")]
    tombstoned: usize,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = load_config(&home)?;
        let catalog_path = config.catalog_path(&home);

        let store = CatalogStore::open(&catalog_path);
        let catalog = block_on(store.load())?
            .with_context(|| format!("failed to read catalog {}", catalog_path.display()))?;

        // Configured origins show up even before their first cycle.
        let mut rows: BTreeMap<String, OriginStatus> = config
            .sources
            .iter()
            .map(|source| {
                let origin = source.origin.to_string();
                let status = OriginStatus {
                    origin: origin.clone(),
                    registered: true,
                    active: 0,
                    tombstoned: 0,
                };
                (origin, status)
            })
            .collect();
        for (origin, active, tombstoned) in catalog.origin_counts() {
            let row = rows.entry(origin.to_string()).or_insert(OriginStatus {
                origin: origin.to_string(),
                registered: false,
                active: 0,
                tombstoned: 0,
            });
            row.active = active;
            row.tombstoned = tombstoned;
        }
        let origins: Vec<OriginStatus> = rows.into_values().collect();

        if self.json {
            let payload = StatusReportJson {
                catalog: catalog_path.display().to_string(),
                interval_secs: config.interval_secs,
                origins,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&origins);
        Ok(())
    }
}

fn print_table(origins: &[OriginStatus]) {
    let active: usize = origins.iter().map(|o| o.active).sum();
    let tombstoned: usize = origins.iter().map(|o| o.tombstoned).sum();
    println!(
        "repo-updater v{} | {} origins | {} active | {} tombstoned",
        env!("CARGO_PKG_VERSION"),
        origins.len(),
        active,
        tombstoned,
    );

    if origins.is_empty() {
        println!("Catalog is empty and no sources are configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = origins
        .iter()
        .map(|o| StatusTableRow {
            origin: o.origin.clone(),
            source: if o.registered {
                "configured".to_string()
            } else {
                "unregistered".to_string()
            },
            active: o.active,
            tombstoned: o.tombstoned,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if origins.iter().any(|o| !o.registered) {
        println!(
            "{}",
            "Unregistered origins are left untouched by every cycle.".bright_black()
        );
    }
}

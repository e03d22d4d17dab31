// src/driver.rs
//! Background driver: ticks once a minute and runs a cycle over every
//! category whose adaptive interval has elapsed. The interval itself is
//! advisory metadata owned by the velocity tracker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::Orchestrator;
use crate::velocity::VelocityTracker;

const TICK_SECS: u64 = 60;

pub fn spawn_ingest_driver(
    orchestrator: Arc<Orchestrator>,
    velocity: Arc<VelocityTracker>,
    categories: Vec<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_run: HashMap<String, Instant> = HashMap::new();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));

        loop {
            ticker.tick().await;

            let now = Instant::now();
            let due: Vec<String> = categories
                .iter()
                .filter(|category| {
                    match last_run.get(*category) {
                        // Never fetched this process: due immediately.
                        None => true,
                        Some(prev) => {
                            let interval_secs =
                                u64::from(velocity.interval(category)) * 60;
                            now.duration_since(*prev).as_secs() >= interval_secs
                        }
                    }
                })
                .cloned()
                .collect();

            if due.is_empty() {
                debug!(target: "driver", "no categories due this tick");
                continue;
            }

            let report = orchestrator.run_cycle(&due).await;
            for category in &due {
                last_run.insert(category.clone(), now);
            }
            debug!(
                target: "driver",
                categories = due.len(),
                saved = report.totals().saved,
                "driver tick finished"
            );
        }
    })
}

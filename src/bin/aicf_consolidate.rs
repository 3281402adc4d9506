use std::sync::Arc;

use aicf_consolidator::{init_tracing, run_one_cycle, Config, Stats, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let stats = Arc::new(Stats::new());
    let clock = SystemClock;

    tracing::info!(
        output_root = %config.output_root.display(),
        project_name = %config.project_name,
        cycle_interval_secs = config.cycle_interval.as_secs(),
        "aicf-consolidate starting"
    );

    let mut ticker = tokio::time::interval(config.cycle_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_one_cycle(&config, &stats, &clock).await {
                    tracing::warn!(error = %e, "cycle failed, cursors not advanced");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let snapshot = stats.snapshot();
                tracing::info!(cycles_run = snapshot.cycles_run, "shutting down");
                break;
            }
        }
    }

    Ok(())
}

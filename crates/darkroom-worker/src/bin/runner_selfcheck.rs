use std::time::Duration;

use darkroom_worker::{init_tracing, run_selfcheck, WorkerConfig};

const DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&["darkroom_worker=info", "darkroom_queue=info"]);

    let config = WorkerConfig::from_env();
    println!(
        "runner-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );

    let report = run_selfcheck(&config, DEADLINE).await?;

    for outcome in &report.outcomes {
        match &outcome.error {
            Some(error) => println!(
                "runner-selfcheck: {} -> {} ({})",
                outcome.job_type,
                outcome.status.as_str(),
                error
            ),
            None => println!(
                "runner-selfcheck: {} -> {}",
                outcome.job_type,
                outcome.status.as_str()
            ),
        }
    }
    for job_type in &report.uncovered {
        println!("runner-selfcheck: {} has no runner", job_type);
    }

    if !report.is_healthy() {
        let failed: Vec<_> = report.failures().map(|o| o.job_type.as_str()).collect();
        return Err(anyhow::anyhow!("probe jobs failed: {}", failed.join(", ")));
    }

    println!("runner-selfcheck: ok ({} runners)", report.runners);
    Ok(())
}

use std::path::Path;

use crate::cli::commands::BatchArgs;
use crate::errors::V2rError;
use crate::pipeline::{compute_summary, PocJob, PocPipeline};
use super::render;
use tracing::info;

pub async fn handle_batch(args: BatchArgs, quiet: bool) -> Result<(), V2rError> {
    let config = super::load(args.config.as_deref()).await?;
    let jobs = read_jobs(Path::new(&args.jobs)).await?;
    if jobs.is_empty() {
        return Err(V2rError::InvalidRequest(format!("No jobs in {}", args.jobs)));
    }

    let pipeline = PocPipeline::from_config(super::build_runtime(args.dry_run)?, &config);

    info!(jobs = jobs.len(), concurrency = args.concurrency, "Running PoC batch");
    let spinner = render::spinner(&format!("Reproducing {} PoCs", jobs.len()), quiet || args.json);
    let records = pipeline.run_batch(&jobs, args.concurrency).await;
    spinner.finish_and_clear();

    let summary = compute_summary(&records);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}", render::render_record_line(record));
        }
        println!("{}", render::render_summary(&summary));
    }

    if let Some(path) = &args.output {
        super::write_json(path, &records).await?;
        if !quiet && !args.json {
            println!("Records written to {}", path);
        }
    }
    Ok(())
}

async fn read_jobs(path: &Path) -> Result<Vec<PocJob>, V2rError> {
    let content = tokio::fs::read_to_string(path).await
        .map_err(|e| V2rError::InvalidRequest(format!("Cannot read jobs file {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| V2rError::InvalidRequest(format!("Invalid jobs file {}: {}", path.display(), e)))
}

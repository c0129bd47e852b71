use serde::Serialize;

use crate::cli::commands::ReproduceArgs;
use crate::container::RuntimeMode;
use crate::errors::V2rError;
use crate::models::{ReproductionOutcome, ReproductionRequest};
use crate::reproduction::{PocReproducer, ReproducerSettings};
use crate::scoring::{ReliabilityScorer, ScoreBreakdown};
use super::render;
use tracing::info;

#[derive(Serialize)]
struct ReproduceReport<'a> {
    outcome: &'a ReproductionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<ScoreBreakdown>,
}

pub async fn handle_reproduce(args: ReproduceArgs, quiet: bool) -> Result<(), V2rError> {
    let config = super::load(args.config.as_deref()).await?;
    let runtime = super::build_runtime(args.dry_run)?;

    let mut settings = ReproducerSettings::from_config(&config);
    if args.strict {
        settings.mode = RuntimeMode::Strict;
    }
    let reproducer = PocReproducer::new(runtime, &config).with_settings(settings);

    let timeout = args.timeout
        .or(config.reproduction().timeout_secs)
        .unwrap_or(crate::config::DEFAULT_TIMEOUT_SECS);
    let request = ReproductionRequest::new(args.script.clone(), args.poc_type.clone())
        .with_target(args.target.clone().unwrap_or_default())
        .with_timeout(timeout)
        .with_network(!args.no_network)
        .with_evidence(args.evidence)
        .with_snapshot(args.snapshot);
    request.validate()?;

    info!(poc_type = %request.poc_type, dry_run = args.dry_run, "Reproducing PoC");
    let spinner = render::spinner("Reproducing PoC", quiet || args.json);
    let outcome = reproducer.reproduce(&request).await;
    spinner.finish_and_clear();

    let scorer = ReliabilityScorer::from_config(&config);
    let score = args.source.as_deref().map(|source| scorer.score_outcome(source, &outcome));
    let report = ReproduceReport { outcome: &outcome, score };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render::render_outcome(&outcome));
        if let Some(breakdown) = &score {
            println!("{}", render::render_breakdown(breakdown, scorer.verified_threshold()));
        }
    }

    if let Some(path) = &args.output {
        super::write_json(path, &report).await?;
        if !quiet && !args.json {
            println!("Result written to {}", path);
        }
    }

    if outcome.success {
        Ok(())
    } else {
        Err(V2rError::Container(outcome.error.unwrap_or_else(|| "Reproduction failed".into())))
    }
}

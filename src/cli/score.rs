use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cli::commands::ScoreArgs;
use crate::errors::V2rError;
use crate::models::ReproductionStatus;
use crate::scoring::ReliabilityScorer;
use super::render;

pub async fn handle_score(args: ScoreArgs) -> Result<(), V2rError> {
    let config = super::load(args.config.as_deref()).await?;
    let scorer = ReliabilityScorer::from_config(&config);

    let status: ReproductionStatus = args.status.parse()?;
    let evidence = parse_evidence(&args.evidence)?;
    let breakdown = scorer.score(&args.source, status, &evidence);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    } else {
        println!("{}", render::render_breakdown(&breakdown, scorer.verified_threshold()));
    }
    Ok(())
}

/// Parse `kind=path` pairs.
pub fn parse_evidence(pairs: &[String]) -> Result<BTreeMap<String, PathBuf>, V2rError> {
    pairs.iter()
        .map(|pair| match pair.split_once('=') {
            Some((kind, path)) if !kind.trim().is_empty() => {
                Ok((kind.trim().to_lowercase(), PathBuf::from(path.trim())))
            }
            _ => Err(V2rError::InvalidRequest(format!("Evidence must be kind=path, got '{}'", pair))),
        })
        .collect()
}

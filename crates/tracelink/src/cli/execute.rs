//! Command execution logic.

use anyhow::Result;

use super::args::{BuildArgs, CoverageArgs, ImpactArgs, InitArgs, LinkArgs, LinksArgs, PurgeArgs};
use crate::app::App;
use crate::config::{ImpactOptions, MatrixOptions};
use crate::domain::{DocumentId, MatrixId, NewRelationship, RelationshipType, RequirementId};
use crate::output::{self, OutputMode};

/// Execute the init command
pub async fn execute_init(args: &InitArgs, output_mode: OutputMode) -> Result<()> {
    use crate::commands::init;

    let current_dir = std::env::current_dir()?;
    let result = init::init(&current_dir).await?;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "tracelink_dir": result.tracelink_dir.display().to_string(),
            "config_file": result.config_file.display().to_string(),
            "requirements_file": result.requirements_file.display().to_string(),
            "records_file": result.records_file.display().to_string(),
        }))?,
        OutputMode::Text if !args.quiet => {
            println!("Initialized tracelink in {}", result.tracelink_dir.display());
            println!("  Config:       {}", result.config_file.display());
            println!("  Requirements: {}", result.requirements_file.display());
            println!("  Records:      {}", result.records_file.display());
        }
        OutputMode::Text => {}
    }

    Ok(())
}

/// Execute the build command
pub async fn execute_build(app: &App, args: &BuildArgs, output_mode: OutputMode) -> Result<()> {
    let document_ids: Vec<DocumentId> = args.docs.iter().map(DocumentId::new).collect();
    let options = MatrixOptions {
        max_pairs: args.max_pairs,
        min_confidence: args.min_confidence,
        coverage_threshold: None,
        exclude_manual: args.no_manual,
    };

    let run = app
        .engine()
        .build_traceability_matrix(&document_ids, &options)
        .await?;

    output::print_matrix_run(&run, app.engine().config().coverage_threshold, output_mode)?;
    Ok(())
}

/// Execute the coverage command
pub async fn execute_coverage(app: &App, args: &CoverageArgs, output_mode: OutputMode) -> Result<()> {
    let record = app
        .engine()
        .get_coverage(&MatrixId::new(args.matrix_id.as_str()))
        .await?;

    output::print_coverage(&record, app.engine().config().coverage_threshold, output_mode)?;
    Ok(())
}

/// Execute the impact command
pub async fn execute_impact(app: &App, args: &ImpactArgs, output_mode: OutputMode) -> Result<()> {
    let options = ImpactOptions {
        matrix_id: args.matrix.as_deref().map(MatrixId::new),
        max_depth: args.max_depth,
        impact_threshold: args.threshold,
    };

    let run = app
        .engine()
        .analyze_impact(
            &RequirementId::new(args.requirement_id.as_str()),
            &args.change,
            &options,
        )
        .await?;

    output::print_impact_run(&run, output_mode)?;
    Ok(())
}

/// Execute the link command
pub async fn execute_link(app: &App, args: &LinkArgs, output_mode: OutputMode) -> Result<()> {
    let relationship_type = RelationshipType::from(args.relationship_type);
    let mut new = NewRelationship::new(
        args.source.as_str(),
        args.target.as_str(),
        relationship_type,
    );
    new.confidence = args.confidence;
    new.bidirectional = new.bidirectional || args.bidirectional;
    new.reasoning.clone_from(&args.reason);

    let relationship = app.engine().upsert_manual_relationship(new).await?;

    match output_mode {
        OutputMode::Json => output::print_json(&relationship)?,
        OutputMode::Text => {
            output::print_message(&format!(
                "{} {}",
                output::success("Linked", &output::OutputConfig::from_env()),
                relationship.id
            ))?;
            output::print_relationships(std::slice::from_ref(&relationship), output_mode)?;
        }
    }
    Ok(())
}

/// Execute the links command
pub async fn execute_links(app: &App, _args: &LinksArgs, output_mode: OutputMode) -> Result<()> {
    let relationships = app.engine().list_manual_relationships().await?;
    output::print_relationships(&relationships, output_mode)?;
    Ok(())
}

/// Execute the purge command
pub async fn execute_purge(app: &App, _args: &PurgeArgs, output_mode: OutputMode) -> Result<()> {
    let removed = app.engine().purge_expired().await?;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({ "removed": removed }))?,
        OutputMode::Text => output::print_message(&format!("Removed {removed} expired records"))?,
    }
    Ok(())
}

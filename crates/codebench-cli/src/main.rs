use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebench_core::{
	EvaluationRequest, FileConfig, HttpProvider, Orchestrator, ReportCollector,
};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "codebench", about = "Compare code generated by several models for one prompt")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	Run(RunArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// YAML file with an `orchestrator` section and a `providers` list
	#[arg(long, env = "CODEBENCH_CONFIG")]
	config: PathBuf,

	/// Prompt sent to every model
	#[arg(long)]
	prompt: String,

	/// Model to compare (repeatable). Defaults to every configured provider.
	#[arg(long = "model")]
	models: Vec<String>,

	/// Metric to prioritize, most important first (repeatable)
	#[arg(long = "metric")]
	metrics: Vec<String>,

	/// Output the JSON report to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Run(args) => run(args).await?,
	}
	Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
	let file = FileConfig::load(&args.config).await?;
	if file.providers.is_empty() {
		anyhow::bail!("{:?} lists no providers", args.config);
	}

	let mut builder = Orchestrator::builder().config(file.orchestrator.clone());
	for provider in &file.providers {
		let http = HttpProvider::from_config(provider)
			.with_context(|| format!("Failed to configure provider for {}", provider.model()))?;
		builder = builder.provider(provider.model(), Arc::new(http));
	}
	let orchestrator = builder.build()?;

	let models = if args.models.is_empty() {
		orchestrator.models().map(str::to_string).collect()
	} else {
		args.models
	};
	info!(models = models.len(), "running batch");

	let request = EvaluationRequest::new(args.prompt, models).with_priority(args.metrics);
	let mut collector = ReportCollector::new(request.prompt.clone(), request.models.iter().cloned());
	let mut signals = orchestrator.run(request)?;
	while let Some(signal) = signals.next().await {
		println!("{}", serde_json::to_string(&signal)?);
		collector.observe(&signal);
	}
	let report = collector.finish()?;

	// stdout carries only signal lines
	eprintln!("{}", report.ranking_table());
	if let Some(issues) = &report.summary.potential_issues {
		eprintln!("Potential issues in the best result: {issues}");
	}

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&report)?;
		tokio::fs::write(&path, json)
			.await
			.with_context(|| format!("Failed to write {:?}", path))?;
	}

	Ok(())
}

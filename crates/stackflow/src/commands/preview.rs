use colored::Colorize;
use stackflow_cloud::MemoryProvider;
use std::path::Path;
use std::sync::Arc;

pub async fn handle(path: Option<&Path>, fail_on: Vec<String>) -> anyhow::Result<()> {
    let (config, stack) = super::load_stack(path)?;

    let mut provider = MemoryProvider::new(config.region.as_str());
    for name in fail_on {
        provider = provider.fail_on(name);
    }

    println!("{}", "Previewing against the in-memory provider...".blue());
    let deployment = stack.deploy(Arc::new(provider)).await?;
    let report = &deployment.report;

    println!();
    println!(
        "{} created, {} failed, {} skipped in {}ms",
        report.succeeded.len().to_string().green(),
        report.failed.len().to_string().red(),
        report.skipped.len().to_string().yellow(),
        report.duration_ms
    );
    for failed in &report.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failed.action_id.bold(),
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    for skipped in &report.skipped {
        println!(
            "  {} {} (blocked by {})",
            "-".yellow(),
            skipped.action_id,
            skipped.blocked_by
        );
    }

    println!();
    println!("{}", "Exports:".bold());
    for (key, value) in deployment.exports.iter() {
        println!("  {}: {}", key.cyan(), value);
    }
    for (key, failure) in deployment.exports.unavailable() {
        println!("  {}: {} ({})", key.cyan(), "unavailable".red(), failure);
    }

    if !report.is_success() {
        eprintln!();
        eprintln!("{}", "✗ Stack partially deployed".red().bold());
        std::process::exit(1);
    }

    println!();
    println!("{}", "✓ Stack deployed".green().bold());
    Ok(())
}

use colored::Colorize;
use stackflow_cloud::ActionType;
use std::path::Path;

pub fn handle(path: Option<&Path>) -> anyhow::Result<()> {
    let (config, stack) = super::load_stack(path)?;
    let graph = stack.graph();

    println!(
        "Stack: {} (Lago {}, {})",
        graph.name().cyan().bold(),
        config.lago_version,
        config.region
    );
    println!();

    println!("{}", "Components:".bold());
    for component in graph.components() {
        println!(
            "  {} {} ({} resources)",
            component.name.cyan(),
            component.type_tag.dimmed(),
            component.resources.len()
        );
    }
    println!();

    let plan = stack.plan();
    println!("{}", "Waves:".bold());
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, wave.join(", "));
    }
    println!();

    println!("{}", "Actions:".bold());
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Generate => "*".yellow(),
        };
        println!(
            "  {} {} ({})",
            marker,
            action.id.bold(),
            action.resource_type.dimmed()
        );
        if !action.depends_on.is_empty() {
            println!("      after: {}", action.depends_on.join(", "));
        }
        let details = serde_json::to_string_pretty(&action.details)?;
        for line in details.lines() {
            println!("      {}", line);
        }
    }
    println!();

    println!("{} {}", "Plan:".bold(), plan.summary());
    Ok(())
}

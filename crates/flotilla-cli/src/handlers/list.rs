//! List command handler.

use anyhow::Result;
use flotilla_core::{ServiceDefinition, ServiceKind};

use crate::bootstrap::CliContext;

/// Print every service in declared order.
pub fn execute(ctx: &CliContext) -> Result<()> {
    let registry = ctx.supervisor().registry();

    if registry.is_empty() {
        println!("No services defined in {}", ctx.manifest_path().display());
        return Ok(());
    }

    println!(
        "{} service(s) in {}:\n",
        registry.len(),
        ctx.manifest_path().display()
    );
    println!("{:<20} {:<9} {:<6} {:<9} Command", "Name", "Kind", "Port", "Critical");

    for def in registry.definitions() {
        println!("{}", format_row(def));
    }
    Ok(())
}

fn format_row(def: &ServiceDefinition) -> String {
    let kind = match def.kind {
        ServiceKind::Managed => "managed",
        ServiceKind::External => "external",
    };
    let port = def.port.map_or_else(|| "--".to_string(), |p| p.to_string());
    let critical = if def.critical { "yes" } else { "no" };
    let command = match def.command.as_deref() {
        Some(cmd) => std::iter::once(cmd)
            .chain(def.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        None => "--".to_string(),
    };

    format!("{:<20} {kind:<9} {port:<6} {critical:<9} {command}", def.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row_managed() {
        let def = ServiceDefinition::managed("backend", "python")
            .with_args(["-m", "app"])
            .with_port(8000);
        let row = format_row(&def);
        assert!(row.starts_with("backend"));
        assert!(row.contains("managed"));
        assert!(row.contains("8000"));
        assert!(row.ends_with("python -m app"));
    }

    #[test]
    fn test_format_row_external() {
        let def = ServiceDefinition::external("frontend", 5173).non_critical();
        let row = format_row(&def);
        assert!(row.contains("external"));
        assert!(row.contains(" no "));
        assert!(row.ends_with("--"));
    }
}

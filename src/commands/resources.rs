//! `steward resources` - list resource types

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::resource::Catalog;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let catalog = Catalog::new(&ctx.config);

    for info in catalog.describe() {
        ui::section(&info.name);
        if !info.description.is_empty() {
            ui::dim(&info.description);
        }

        println!("  {}", "actions".bold());
        for (action, description) in &info.actions {
            let marker = if *action == info.default_action { " (default)" } else { "" };
            println!("    {}{}  {}", action.green(), marker.dimmed(), description);
        }

        println!("  {}", "properties".bold());
        for property in &info.properties {
            let name_marker = if property.name_property { " (name)" } else { "" };
            println!(
                "    {}{}  {}  {}",
                property.name.cyan(),
                name_marker.dimmed(),
                property.kind.to_string().dimmed(),
                property.description
            );
        }
    }
    Ok(())
}

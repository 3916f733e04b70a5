use anyhow::{Result, bail};
use std::path::Path;

use super::output::{print_failure, print_field, print_heading, print_ok};
use frontdesk::AppConfig;
use frontdesk::core::bootstrap::load_catalog;
use frontdesk::core::recipe::RecipeCatalog;

pub async fn list_recipes(config: &AppConfig) -> Result<()> {
    let catalog = load_catalog(config).await?;
    let recipes = catalog.list().await;
    if recipes.is_empty() {
        println!("No recipes loaded.");
        return Ok(());
    }
    for recipe in recipes {
        print_heading(&recipe.name);
        print_field("intent", &recipe.intent);
        print_field("description", &recipe.description);
        print_field("requires", &recipe.required_entities.join(", "));
        print_field("steps", &recipe.steps.len().to_string());
    }
    Ok(())
}

pub async fn validate_file(path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path).await?;
    let recipes = RecipeCatalog::parse_yaml(&content)?;
    let mut invalid = 0;
    for recipe in &recipes {
        match recipe.validate() {
            Ok(()) => print_ok(&recipe.name),
            Err(e) => {
                invalid += 1;
                let label = if recipe.name.trim().is_empty() {
                    "<unnamed>"
                } else {
                    recipe.name.as_str()
                };
                print_failure(&format!("{}: {}", label, e));
            }
        }
    }
    if invalid > 0 {
        bail!("{} of {} recipes are invalid", invalid, recipes.len());
    }
    println!("{} recipes valid", recipes.len());
    Ok(())
}

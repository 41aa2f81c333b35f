use std::path::Path;

use clap::{Args, Subcommand};
use testctl_core::scenario_manager::ScenarioManager;
use uuid::Uuid;

use crate::{OutputFormat, Result};

#[derive(Subcommand, Debug)]
pub enum ScenarioCommands {
    /// Build a scenario from a built-in template (smoke_api, smoke_ui,
    /// quality_baseline) and persist it under the storage directory.
    Generate(GenerateArgs),
    /// List every scenario currently on disk.
    List,
    /// Show one scenario by id.
    Show(IdArgs),
    /// Delete one scenario by id.
    Delete(IdArgs),
    /// Group existing scenario ids into a named, ordered collection.
    Collection(CollectionArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Template name: smoke_api, smoke_ui, or quality_baseline.
    pub template: String,
    /// Human-readable scenario name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    pub id: Uuid,
}

#[derive(Args, Debug)]
pub struct CollectionArgs {
    /// Collection name.
    pub name: String,
    /// Scenario ids, in the order the collection should preserve.
    pub ids: Vec<Uuid>,
}

pub fn dispatch(storage_dir: &Path, format: OutputFormat, command: ScenarioCommands) -> Result<()> {
    let manager = ScenarioManager::new(storage_dir);
    manager.load_from_disk()?;

    match command {
        ScenarioCommands::Generate(args) => {
            let scenario = manager.generate_from_template(&args.template, args.name)?;
            let created = manager.create(scenario)?;
            print_one(format, &created);
        }
        ScenarioCommands::List => {
            let scenarios = manager.list();
            print_many(format, &scenarios);
        }
        ScenarioCommands::Show(args) => {
            let scenario = manager.get(args.id)?;
            print_one(format, &scenario);
        }
        ScenarioCommands::Delete(args) => {
            manager.delete(args.id)?;
            println!("deleted {}", args.id);
        }
        ScenarioCommands::Collection(args) => {
            let collection = manager.create_collection(args.name, args.ids)?;
            print_one(format, &collection);
        }
    }
    Ok(())
}

fn print_one<T: serde::Serialize + std::fmt::Debug>(format: OutputFormat, value: &T) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value).expect("serializable")),
        OutputFormat::Text => println!("{value:#?}"),
    }
}

fn print_many<T: serde::Serialize + std::fmt::Debug>(format: OutputFormat, values: &[T]) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(values).expect("serializable")),
        OutputFormat::Text => {
            for value in values {
                println!("{value:#?}");
            }
        }
    }
}

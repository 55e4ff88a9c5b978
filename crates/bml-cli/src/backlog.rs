use anyhow::{Context, Result};
use bml_core::{ItemId, PriorityKey, SlotMap, WorkflowStage};
use bml_ordering::{execute, Command, CommandResult, OrderingEngine, PrioritizedItem};
use bml_storage::FileTagStore;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

pub struct Backlog {
    pub engine: OrderingEngine<FileTagStore>,
    pub collection: String,
    pub json: bool,
}

impl Backlog {
    pub async fn list(&self, by_lane: bool) -> Result<()> {
        if by_lane {
            let lanes = self.engine.lanes(&self.collection).await?;
            return self.print_lanes(&lanes);
        }
        let items = self.engine.ordered_items(&self.collection).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&items)?);
            return Ok(());
        }
        if items.is_empty() {
            println!("No items in collection '{}'", self.collection);
            return Ok(());
        }
        for (idx, item) in items.iter().enumerate() {
            println!("{:>3}. {}", idx + 1, item_line(item));
        }
        Ok(())
    }

    fn print_lanes(&self, lanes: &BTreeMap<WorkflowStage, Vec<PrioritizedItem>>) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(lanes)?);
            return Ok(());
        }
        for stage in WorkflowStage::ALL {
            let Some(items) = lanes.get(&stage) else {
                continue;
            };
            println!("== {stage} ({}) ==", items.len());
            for item in items {
                println!("  {}", item_line(item));
            }
        }
        Ok(())
    }

    pub async fn show(&self, item: &ItemId) -> Result<()> {
        let item = self.engine.item(&self.collection, item).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&item)?);
            return Ok(());
        }
        println!("Item #{}", item.id);
        println!(
            "  priority: {}",
            item.key
                .as_ref()
                .map(PriorityKey::to_string)
                .unwrap_or_else(|| "-".to_string())
        );
        println!("  status:   {}", item.stage);
        if let Some(parent) = item.key.as_ref().and_then(PriorityKey::parent) {
            println!("  parent:   {parent}");
        }
        println!("  tags:     {}", item.tags.join(", "));
        Ok(())
    }

    pub async fn add_items(&self, items: Vec<ItemId>) -> Result<bool> {
        let requested = items.len();
        let created = self
            .engine
            .store()
            .create_items(&self.collection, items)
            .await?;
        let result = CommandResult::ok(format!(
            "Created {created} of {requested} item(s) in '{}'",
            self.collection
        ));
        self.print_result(&result)?;
        Ok(result.success)
    }

    pub async fn run(&self, command: Command) -> Result<bool> {
        let result = execute(&self.engine, &self.collection, command).await;
        self.print_result(&result)?;
        Ok(result.success)
    }

    fn print_result(&self, result: &CommandResult) -> Result<()> {
        if self.json {
            let payload = json!({
                "collection": self.collection,
                "result": result,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else if result.success {
            println!("{}", result.summary);
        } else {
            eprintln!("{}", result.summary);
        }
        Ok(())
    }
}

fn item_line(item: &PrioritizedItem) -> String {
    let key = item
        .key
        .as_ref()
        .map(PriorityKey::to_string)
        .unwrap_or_else(|| "-".to_string());
    let indent = "  ".repeat(item.key.as_ref().map(PriorityKey::depth).unwrap_or(0));
    format!("{indent}{key:<10} #{:<8} [{}]", item.id.to_string(), item.stage)
}

/// Reads a slot map from a file, or from stdin when `path` is `-`.
pub fn read_slot_map(path: &Path) -> Result<SlotMap> {
    let payload = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read slot map from stdin")?;
        buffer
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read slot map {}", path.display()))?
    };
    SlotMap::from_json(&payload).context("Failed to parse slot map")
}

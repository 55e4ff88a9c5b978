use crate::engine::OrderingEngine;
use crate::propagation::PropagationOutcome;
use crate::OrderingError;
use bml_core::{ItemId, PriorityKey, SlotMap, TagStore, WorkflowStage};
use serde::Serialize;

#[derive(Debug, Clone)]
pub enum Command {
    SetPriority {
        item: ItemId,
        key: PriorityKey,
        inherit: bool,
    },
    SetStage {
        item: ItemId,
        stage: WorkflowStage,
    },
    AdvanceStage {
        item: ItemId,
    },
    MoveAbove {
        item: ItemId,
        target: ItemId,
    },
    MoveBelow {
        item: ItemId,
        target: ItemId,
    },
    MoveBetween {
        item: ItemId,
        above: ItemId,
        below: ItemId,
    },
    Propagate {
        item: ItemId,
    },
    SyncSubtree {
        root: PriorityKey,
    },
    Resync {
        slot_map: SlotMap,
    },
}

/// Uniform result of a mutating command, printed as text or JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn failed(err: &OrderingError) -> Self {
        Self {
            success: false,
            summary: format!("Error: {err}"),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    fn with_key(mut self, key: &PriorityKey) -> Self {
        self.key = Some(key.to_string());
        self
    }

    fn with_stage(mut self, stage: WorkflowStage) -> Self {
        self.stage = Some(stage.to_string());
        self
    }
}

pub async fn execute<S: TagStore>(
    engine: &OrderingEngine<S>,
    collection: &str,
    command: Command,
) -> CommandResult {
    match run(engine, collection, command).await {
        Ok(result) => result,
        Err(err) => CommandResult::failed(&err),
    }
}

async fn run<S: TagStore>(
    engine: &OrderingEngine<S>,
    collection: &str,
    command: Command,
) -> Result<CommandResult, OrderingError> {
    match command {
        Command::SetPriority {
            item,
            key,
            inherit: false,
        } => {
            engine.set_priority(collection, &item, &key).await?;
            Ok(CommandResult::ok(format!("Set item #{item} priority to {key}")).with_key(&key))
        }
        Command::SetPriority {
            item,
            key,
            inherit: true,
        } => {
            let outcome = engine
                .set_priority_with_inheritance(collection, &item, &key)
                .await?;
            let base = format!("Set item #{item} priority to {key}");
            Ok(match outcome {
                PropagationOutcome::Inherited { parent, stage, .. } => CommandResult::ok(format!(
                    "{base} | Inherited status '{stage}' from parent #{parent}"
                ))
                .with_key(&key)
                .with_stage(stage),
                PropagationOutcome::NoParent => CommandResult::ok(base).with_key(&key),
                PropagationOutcome::ParentMissing { parent_key } => CommandResult::ok(format!(
                    "{base} | No item holds parent priority {parent_key}"
                ))
                .with_key(&key),
            })
        }
        Command::SetStage { item, stage } => {
            let outcome = engine.set_stage(collection, &item, stage).await?;
            let mut summary = format!("Set item #{item} status to {stage}");
            if outcome.cleanup_failed > 0 {
                summary.push_str(&format!(
                    " | {} stale status tag(s) could not be removed",
                    outcome.cleanup_failed
                ));
            }
            Ok(CommandResult::ok(summary).with_stage(stage))
        }
        Command::AdvanceStage { item } => {
            let outcome = engine.advance_stage(collection, &item).await?;
            let from = outcome.previous.unwrap_or_default();
            Ok(CommandResult::ok(format!(
                "Moved item #{item} from {from} to {}",
                outcome.stage
            ))
            .with_stage(outcome.stage))
        }
        Command::MoveAbove { item, target } => {
            let outcome = engine.move_above(collection, &item, &target).await?;
            Ok(CommandResult::ok(outcome.summary()).with_key(&outcome.key))
        }
        Command::MoveBelow { item, target } => {
            let outcome = engine.move_below(collection, &item, &target).await?;
            Ok(CommandResult::ok(outcome.summary()).with_key(&outcome.key))
        }
        Command::MoveBetween { item, above, below } => {
            let outcome = engine
                .move_between(collection, &item, &above, &below)
                .await?;
            Ok(CommandResult::ok(outcome.summary()).with_key(&outcome.key))
        }
        Command::Propagate { item } => match engine.propagate_item(collection, &item).await? {
            PropagationOutcome::Inherited { parent, stage, .. } => Ok(CommandResult::ok(format!(
                "Item #{item} inherited status '{stage}' from parent #{parent}"
            ))
            .with_stage(stage)),
            PropagationOutcome::NoParent => Ok(CommandResult::ok(format!(
                "Item #{item} is a root item; nothing to inherit"
            ))),
            PropagationOutcome::ParentMissing { parent_key } => Ok(CommandResult::ok(format!(
                "No item holds parent priority {parent_key}; item #{item} unchanged"
            ))),
        },
        Command::SyncSubtree { root } => {
            let report = engine.sync_subtree(collection, &root).await?;
            let result = CommandResult {
                success: report.failed == 0,
                summary: format!(
                    "Synced subtree {root} | Examined: {} | Inherited: {} | Unchanged: {} | Skipped: {} | Failed: {}",
                    report.examined,
                    report.inherited,
                    report.unchanged,
                    report.skipped,
                    report.failed
                ),
                key: Some(root.to_string()),
                ..CommandResult::default()
            };
            Ok(result)
        }
        Command::Resync { slot_map } => {
            let report = engine.reconcile(collection, &slot_map).await?;
            let summary = format!(
                "Reconciled {} of {} entries | Items cleared: {}/{}",
                report.updated,
                report.planned,
                report.clear_tags.succeeded,
                report.clear_tags.attempted
            );
            match report.into_result() {
                Ok(_) => Ok(CommandResult::ok(summary)),
                Err(err) => Ok(CommandResult {
                    success: false,
                    summary: format!("{summary} | Error: {err}"),
                    error: Some(err.to_string()),
                    ..CommandResult::default()
                }),
            }
        }
    }
}

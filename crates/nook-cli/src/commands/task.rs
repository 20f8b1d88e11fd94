//! Task management commands for CLI.

use chrono::Utc;
use clap::Subcommand;
use nook_core::{Task, TaskProvider};

use super::context::AppContext;
use super::CliResult;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a new task
    Add {
        /// Task title
        title: String,
        /// Category used for focus attribution
        #[arg(long)]
        category: Option<String>,
        /// Priority, 1 (lowest) to 4 (highest)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        priority: Option<u8>,
        /// Estimated focus sessions
        #[arg(long, default_value = "1")]
        estimate: u32,
    },
    /// List tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Focus a task; completed focus sessions are credited to it
    Focus {
        /// Task ID
        id: Option<String>,
        /// Clear the focused task
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
    /// Mark a task as completed
    Complete {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> CliResult {
    let mut ctx = AppContext::open()?;

    match action {
        TaskAction::Add {
            title,
            category,
            priority,
            estimate,
        } => {
            let mut task = Task::new(title, Utc::now());
            task.category = category;
            task.priority = priority;
            task.estimated_units = estimate.max(1);
            let task = ctx.orch.tasks_mut().add(task);
            println!("{}", serde_json::to_string_pretty(task)?);
        }
        TaskAction::List { json } => {
            let list = ctx.orch.tasks();
            if json {
                println!("{}", serde_json::to_string_pretty(list.tasks())?);
            } else {
                let focused = list.focused_task_id();
                for task in list.tasks() {
                    let mark = if task.completed { "x" } else { " " };
                    let focus = if focused.as_deref() == Some(task.id.as_str()) { "*" } else { " " };
                    let priority = task.priority.map(|p| format!(" P{p}")).unwrap_or_default();
                    println!(
                        "{focus}[{mark}] {}  {} ({}{priority}) {}/{}",
                        task.id,
                        task.title,
                        task.category_or_default(),
                        task.completed_units,
                        task.estimated_units,
                    );
                }
            }
        }
        TaskAction::Focus { id, clear } => {
            let target = if clear { None } else { id.as_deref() };
            if target.is_none() && !clear {
                return Err("task id or --clear required".into());
            }
            ctx.orch.tasks_mut().set_focus(target)?;
            match target {
                Some(id) => println!("focused {id}"),
                None => println!("focus cleared"),
            }
        }
        TaskAction::Complete { id } => {
            let first = ctx.orch.tasks_mut().complete(&id, Utc::now())?;
            if first {
                ctx.orch.stats().update(|agg| agg.record_task_completed());
                println!("completed {id}");
            } else {
                println!("already completed {id}");
            }
        }
    }

    ctx.save()
}

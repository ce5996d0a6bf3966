use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tasklist::{App, Config, FilteredView, NewTask, Task, TaskPatch, TaskQuery};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(about = "Local task list with an exportable analytics log")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the config file (default: <config dir>/tasklist/tasklist.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task to the top of the list
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<i64>,
        /// Due date, stored as given
        #[arg(long)]
        due: Option<String>,
    },

    /// Show tasks in list order
    List {
        /// Only show tasks whose title or description contains this text
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Mark a task as done
    Done { id: String },

    /// Mark a task as not done
    Undone { id: String },

    /// Flip a task between done and not done
    Toggle { id: String },

    /// Edit task fields
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// New description (empty string clears it)
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// New due date (empty string clears it)
        #[arg(long)]
        due: Option<String>,
    },

    /// Delete a task
    Delete { id: String },

    /// Move the task at one position to another (1-based, as shown by `list`)
    Move {
        from: NonZeroUsize,
        to: NonZeroUsize,
        /// Positions refer to the list filtered by this text
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Move a task one position up
    Up { id: String },

    /// Move a task one position down
    Down { id: String },

    /// Remove every task
    Clear {
        /// Confirm clearing all tasks
        #[arg(long)]
        yes: bool,
    },

    /// Show aggregate counts
    Stats,

    /// Show the analytics log
    Events,

    /// Write the analytics log to tm_analytics.json
    Export {
        /// Directory to write into (default: export_dir from config, else current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let storage = config.open_storage()?;
    let mut app = App::open(storage).with_event_logging(config.log_events);

    match cli.command {
        Commands::Add {
            title,
            description,
            priority,
            due,
        } => {
            let title = title.trim();
            if title.is_empty() {
                return Err(eyre!("Task title cannot be empty"));
            }
            let payload = NewTask {
                title: title.to_string(),
                description: description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
                priority,
                due_date: due,
            };
            let task = app.add_task(payload);
            println!("Added {} {}", short_id(&task).dimmed(), task.title.bold());
        }
        Commands::List { query } => {
            let tasks = app.store().tasks();
            let query = TaskQuery::new(query.as_deref().unwrap_or(""));
            let view = FilteredView::new(&tasks, &query);
            for (position, (_, task)) in view.iter().enumerate() {
                print_task(position + 1, task);
            }
            println!("{}", format!("{} of {} tasks", view.len(), tasks.len()).dimmed());
        }
        Commands::Done { id } => {
            let id = app.resolve_id(&id)?;
            app.set_done(&id, true);
            println!("Marked {} done", id.dimmed());
        }
        Commands::Undone { id } => {
            let id = app.resolve_id(&id)?;
            app.set_done(&id, false);
            println!("Marked {} not done", id.dimmed());
        }
        Commands::Toggle { id } => {
            let id = app.resolve_id(&id)?;
            match app.toggle(&id) {
                Some(true) => println!("Marked {} done", id.dimmed()),
                Some(false) => println!("Marked {} not done", id.dimmed()),
                None => return Err(eyre!("No task matches id {}", id)),
            }
        }
        Commands::Edit {
            id,
            title,
            description,
            priority,
            due,
        } => {
            let id = app.resolve_id(&id)?;
            let patch = TaskPatch {
                title: title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
                description: description.map(non_empty),
                done: None,
                priority,
                due_date: due.map(non_empty),
            };
            if patch.is_empty() {
                return Err(eyre!("Nothing to edit; pass at least one field"));
            }
            app.update_task(&id, &patch);
            println!("Updated {}", id.dimmed());
        }
        Commands::Delete { id } => {
            let id = app.resolve_id(&id)?;
            app.delete_task(&id);
            println!("Deleted {}", id.dimmed());
        }
        Commands::Move { from, to, query } => {
            let (from, to) = (from.get() - 1, to.get() - 1);
            let moved = match query {
                Some(query) => app.move_in_view(&query, from, to)?,
                None => {
                    app.reorder(from, to)?;
                    from != to
                }
            };
            if !moved {
                println!("Nothing to move");
            }
        }
        Commands::Up { id } => {
            let id = app.resolve_id(&id)?;
            if !app.move_up(&id)? {
                println!("Already at the top");
            }
        }
        Commands::Down { id } => {
            let id = app.resolve_id(&id)?;
            if !app.move_down(&id)? {
                println!("Already at the bottom");
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                return Err(eyre!("Refusing to clear all tasks without --yes"));
            }
            app.clear_all();
            println!("Cleared all tasks");
        }
        Commands::Stats => {
            let summary = app.summary();
            println!("Total tasks:   {}", summary.total);
            println!("Completed:     {}", summary.completed.to_string().green());
            println!("Open:          {}", summary.open);
            println!("High priority: {}", summary.high_priority.to_string().yellow());
            println!("Events logged: {}", app.log().len());
        }
        Commands::Events => {
            for event in app.log().events() {
                let payload = event
                    .payload
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                println!("{} {} {}", format_ms(event.timestamp).dimmed(), event.event.cyan(), payload);
            }
        }
        Commands::Export { out } => {
            let dir = out.unwrap_or_else(|| config.resolved_export_dir());
            let path = app.export_log(&dir)?;
            println!("Exported {} events to {}", app.log().len(), path.display());
        }
    }

    Ok(())
}

fn print_task(position: usize, task: &Task) {
    let check = if task.done { "[x]".green() } else { "[ ]".normal() };
    let title = if task.done {
        task.title.strikethrough()
    } else {
        task.title.normal()
    };
    let priority = format!("P{}", task.priority);
    let priority = if task.is_high_priority() {
        priority.yellow().bold()
    } else {
        priority.blue()
    };

    println!(
        "{:>3}. {} {} {} {}",
        position,
        check,
        short_id(task).dimmed(),
        priority,
        title
    );
    if let Some(description) = &task.description {
        println!("          {}", description.dimmed());
    }
    if let Some(due) = &task.due_date {
        println!("          due {}", due);
    }
}

/// Trailing characters of the id; unique enough to pass back as an argument
fn short_id(task: &Task) -> &str {
    let start = task.id.len().saturating_sub(8);
    task.id.get(start..).unwrap_or(&task.id)
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.is_empty() { None } else { Some(value) }
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

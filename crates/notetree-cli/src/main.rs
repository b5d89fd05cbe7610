//! NoteTree maintenance CLI.
//!
//! Provides the `notetree` binary for working on a project database while
//! the server is not running: listing projects, exporting a project graph
//! as JSON, and the same relayout and cleanup passes the canvas offers.
//!
//! Graph-changing subcommands load the project through
//! `ConversationGraph::from_snapshot`, so a damaged database is repaired to
//! a valid forest on the next save.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use notetree_core::{ConversationGraph, GraphSnapshot};
use notetree_storage::{ProjectId, ProjectStore, SqliteStore};

/// NoteTree project database tools.
#[derive(Parser)]
#[command(name = "notetree", about = "NoteTree project database tools")]
struct Cli {
    /// Path to the project database file.
    #[arg(short, long, global = true, default_value = "notetree.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List projects, most recently modified first.
    Projects,

    /// Write a project with its nodes and edges as JSON.
    Export {
        /// Project ID to export.
        #[arg(short, long)]
        project: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-run the automatic tree layout on a project.
    Relayout {
        #[arg(short, long)]
        project: String,
    },

    /// Remove blank leaves and isolated nodes from a project.
    Cleanup {
        #[arg(short, long)]
        project: String,

        /// Only remove blank leaves.
        #[arg(long, conflicts_with = "orphans_only")]
        empty_only: bool,

        /// Only remove isolated nodes.
        #[arg(long)]
        orphans_only: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut store = match SqliteStore::new(&cli.db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", cli.db, e);
            process::exit(3);
        }
    };

    let exit_code = match cli.command {
        Commands::Projects => run_projects(&store),
        Commands::Export { project, output } => run_export(&store, &project, output),
        Commands::Relayout { project } => run_relayout(&mut store, &project),
        Commands::Cleanup {
            project,
            empty_only,
            orphans_only,
        } => run_cleanup(&mut store, &project, !orphans_only, !empty_only),
    };
    process::exit(exit_code);
}

fn parse_project(raw: &str) -> Result<ProjectId, i32> {
    raw.parse().map_err(|_| {
        eprintln!("Error: '{}' is not a valid project ID", raw);
        1
    })
}

/// Loads a project graph, reporting entries that had to be dropped.
fn load(store: &SqliteStore, project: ProjectId) -> Result<ConversationGraph, i32> {
    let snapshot = store.load_graph(project).map_err(|e| {
        eprintln!("Error: failed to load project {}: {}", project, e);
        2
    })?;
    let (mut graph, problems) = ConversationGraph::from_snapshot(&snapshot);
    for problem in &problems {
        eprintln!("Warning: skipped stored entry: {}", problem);
    }
    graph.settle_generating(&Default::default());
    Ok(graph)
}

fn save(store: &mut SqliteStore, project: ProjectId, snapshot: &GraphSnapshot) -> i32 {
    match store.save_graph(project, snapshot) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: failed to save project {}: {}", project, e);
            3
        }
    }
}

fn run_projects(store: &SqliteStore) -> i32 {
    let projects = match store.list_projects() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: failed to list projects: {}", e);
            return 3;
        }
    };
    if projects.is_empty() {
        println!("No projects.");
        return 0;
    }
    for project in projects {
        let nodes = store
            .load_graph(project.id)
            .map(|g| g.nodes.len())
            .unwrap_or(0);
        println!(
            "{}  {:<32}  {:>5} nodes  modified {}",
            project.id, project.name, nodes, project.last_modified
        );
    }
    0
}

fn run_export(store: &SqliteStore, raw_id: &str, output: Option<PathBuf>) -> i32 {
    let id = match parse_project(raw_id) {
        Ok(id) => id,
        Err(code) => return code,
    };
    let project = match store.get_project(id) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let graph = match load(store, id) {
        Ok(g) => g,
        Err(code) => return code,
    };

    let document = serde_json::json!({
        "project": project,
        "nodes": graph.nodes(),
        "edges": graph.edges(),
    });
    let text = match serde_json::to_string_pretty(&document) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to encode project: {}", e);
            return 1;
        }
    };

    match output {
        Some(path) => match std::fs::write(&path, text) {
            Ok(()) => {
                eprintln!("Exported {} to {}", project.name, path.display());
                0
            }
            Err(e) => {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                3
            }
        },
        None => {
            println!("{}", text);
            0
        }
    }
}

fn run_relayout(store: &mut SqliteStore, raw_id: &str) -> i32 {
    let id = match parse_project(raw_id) {
        Ok(id) => id,
        Err(code) => return code,
    };
    let mut graph = match load(store, id) {
        Ok(g) => g,
        Err(code) => return code,
    };

    let moved = graph.relayout();
    if moved == 0 {
        println!("Layout already up to date.");
        return 0;
    }
    let code = save(store, id, &graph.snapshot());
    if code == 0 {
        println!("Moved {} node(s).", moved);
    }
    code
}

fn run_cleanup(store: &mut SqliteStore, raw_id: &str, empty: bool, orphans: bool) -> i32 {
    let id = match parse_project(raw_id) {
        Ok(id) => id,
        Err(code) => return code,
    };
    let mut graph = match load(store, id) {
        Ok(g) => g,
        Err(code) => return code,
    };

    let mut removed = 0;
    if empty {
        removed += graph.remove_empty_nodes().len();
    }
    if orphans {
        removed += graph.remove_orphans().len();
    }
    if removed == 0 {
        println!("Nothing to remove.");
        return 0;
    }
    let code = save(store, id, &graph.snapshot());
    if code == 0 {
        println!("Removed {} node(s).", removed);
    }
    code
}

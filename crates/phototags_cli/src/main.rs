//! Command-line inspector for tag databases.
//!
//! # Responsibility
//! - Map command-line flags onto core configuration values.
//! - Expose the tag facade (tree, add, remove, find, path, check) for manual
//!   inspection of a database file.

use clap::{Parser, Subcommand, ValueEnum};
use log::error;
use phototags_core::{
    default_log_level, init_logging, open_db, LayoutChoice, SqliteTagRepository, Tag, TagIcon,
    TagId, TagRepository, TagService, TreeLayout,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "phototags", version, about = "Inspect and edit a photo tag hierarchy")]
struct Cli {
    /// SQLite database file; created when missing.
    db: PathBuf,
    #[arg(long, value_enum, default_value = "detect")]
    layout: LayoutArg,
    /// Absolute directory for rotating log files; logging is off when unset.
    #[arg(long, env = "PHOTOTAGS_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[arg(long, env = "PHOTOTAGS_LOG_LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Detect,
    Adjacency,
    NestedSet,
}

impl From<LayoutArg> for LayoutChoice {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::Detect => LayoutChoice::Detect,
            LayoutArg::Adjacency => LayoutChoice::Fixed(TreeLayout::AdjacencyList),
            LayoutArg::NestedSet => LayoutChoice::Fixed(TreeLayout::NestedSet),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the whole tree
    Tree,
    /// Add a tag
    Add {
        name: String,
        /// Parent tag id; 0 adds a top-level tag
        #[arg(long, default_value_t = 0)]
        parent: TagId,
        /// Symbolic icon name
        #[arg(long)]
        icon: Option<String>,
    },
    /// Remove a childless tag
    Remove { id: TagId },
    /// Resolve a plain name or a `a/b/c` path
    Find { name: String },
    /// Print the hierarchical name of a tag
    Path { id: TagId },
    /// Verify tree invariants
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let conn = open_db(&cli.db, cli.layout)?;
    let service = TagService::new(SqliteTagRepository::try_new(&conn)?);

    match cli.command {
        Command::Tree => {
            for tag in service.top_level()? {
                print_subtree(&service, &tag, 0)?;
            }
        }
        Command::Add { name, parent, icon } => {
            let tag = service.add(&name, parent, TagIcon::from(icon))?;
            println!("{}\t{}", tag.id(), service.hierarchical_name(&tag)?);
        }
        Command::Remove { id } => {
            service.remove(id)?;
            println!("removed {id}");
        }
        Command::Find { name } => {
            let matches = if name.contains('/') {
                vec![service.get_by_path(&name)?]
            } else {
                service.find_by_name(&name)?
            };
            for tag in matches {
                println!("{}\t{}", tag.id(), service.hierarchical_name(&tag)?);
            }
        }
        Command::Path { id } => {
            let tag = service.get(id)?;
            println!("{}", service.hierarchical_name(&tag)?);
        }
        Command::Check => {
            let report = service.check()?;
            println!(
                "ok: {} tags checked ({} layout)",
                report.tags_checked, report.layout
            );
        }
    }
    Ok(())
}

fn print_subtree<R: TagRepository>(
    service: &TagService<R>,
    tag: &Tag,
    depth: usize,
) -> Result<(), Box<dyn Error>> {
    println!("{}{} [{}]", "  ".repeat(depth), tag.name(), tag.id());
    for child in service.children(tag)? {
        print_subtree(service, &child, depth + 1)?;
    }
    Ok(())
}

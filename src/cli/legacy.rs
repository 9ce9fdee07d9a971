use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::OffsetDateTime;

use crate::legacy::{link_ids, plain_text, to_html, LegacyWorkspace, RichNode};
use crate::storage::StorageHandle;

#[derive(Subcommand, Debug, Clone)]
pub enum LegacyCommand {
    /// Print the sidebar outline
    Outline,
    /// Add a heading (after heading N when given)
    AddYear {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        after: Option<usize>,
    },
    /// Add an entry under heading N, or right after another entry
    AddEntry {
        year: usize,
        #[arg(long)]
        after: Option<String>,
    },
    RenameYear { year: usize, title: String },
    RenameEntry { id: String, title: String },
    /// Remove heading N with all its entries
    RemoveYear { year: usize },
    RemoveEntry { id: String },
    /// Replace an entry's content, one paragraph per line (reads stdin when TEXT is omitted)
    Write {
        id: String,
        text: Option<String>,
        /// Treat the input as a JSON node list
        #[arg(long)]
        json: bool,
    },
    /// Print an entry's content
    Show {
        id: String,
        #[arg(long)]
        html: bool,
    },
    /// Create a link record, or update one with --id
    Link {
        keyword: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long)]
        image: Option<String>,
    },
    Unlink { id: String },
    /// List link records
    Links,
    /// Write a backup bundle of all three entries
    Backup {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Restore a backup bundle
    Restore { path: PathBuf },
}

#[derive(Args, Debug, Clone)]
pub struct LegacyArgs {
    #[command(subcommand)]
    pub command: LegacyCommand,
}

pub fn handle(storage: &StorageHandle, args: LegacyArgs) -> Result<String> {
    let mut workspace = LegacyWorkspace::load(storage.clone())?;
    match args.command {
        LegacyCommand::Outline => Ok(format_outline(&workspace)),
        LegacyCommand::AddYear { title, after } => {
            let after = after.map(heading_index).transpose()?;
            let index = workspace.add_year(title.as_deref(), after)?;
            Ok(format!("Added heading {}.\n", index + 1))
        }
        LegacyCommand::AddEntry { year, after } => {
            match workspace.add_event(heading_index(year)?, after.as_deref())? {
                Some(id) => Ok(format!("Added entry {id}\n")),
                None => Ok("No such heading or entry; nothing changed.\n".into()),
            }
        }
        LegacyCommand::RenameYear { year, title } => {
            if workspace.rename_year(heading_index(year)?, &title)? {
                Ok(format!("Renamed heading {year}.\n"))
            } else {
                Ok(format!("No heading {year}.\n"))
            }
        }
        LegacyCommand::RenameEntry { id, title } => {
            if workspace.rename_event(&id, &title)? {
                Ok(format!("Renamed entry {id}.\n"))
            } else {
                Ok(format!("No entry {id}.\n"))
            }
        }
        LegacyCommand::RemoveYear { year } => {
            if workspace.remove_year(heading_index(year)?)? {
                Ok(format!("Removed heading {year}.\n"))
            } else {
                Ok(format!("No heading {year}.\n"))
            }
        }
        LegacyCommand::RemoveEntry { id } => {
            if workspace.remove_event(&id)? {
                Ok(format!("Removed entry {id}.\n"))
            } else {
                Ok(format!("No entry {id}.\n"))
            }
        }
        LegacyCommand::Write { id, text, json } => {
            let raw = match text {
                Some(text) => text,
                None => super::commands::read_stdin()?.unwrap_or_default(),
            };
            let nodes = if json {
                serde_json::from_str(&raw).context("parsing content nodes")?
            } else {
                paragraphs(&raw)
            };
            let links = workspace.set_content(&id, nodes)?;
            Ok(format!("Saved entry {id} with {links} link(s).\n"))
        }
        LegacyCommand::Show { id, html } => {
            let Some(nodes) = workspace.content(&id) else {
                return Ok(format!("Entry {id} has no content.\n"));
            };
            let mut out = if html {
                to_html(nodes)
            } else {
                plain_text(nodes)
            };
            out.push('\n');
            for link in link_ids(nodes) {
                if let Some(tooltip) = workspace.tooltip(link) {
                    let _ = writeln!(&mut out, "  {link}: {}", tooltip.replace('\n', " / "));
                }
            }
            Ok(out)
        }
        LegacyCommand::Link {
            keyword,
            id,
            title,
            content,
            image,
        } => {
            let id = workspace.save_link(id.as_deref(), &keyword, &title, &content, image)?;
            Ok(format!("Saved link {id}\n"))
        }
        LegacyCommand::Unlink { id } => {
            if workspace.remove_link(&id)? {
                Ok(format!("Removed link {id}.\n"))
            } else {
                Ok(format!("No link {id}.\n"))
            }
        }
        LegacyCommand::Links => {
            if workspace.records().is_empty() {
                return Ok("No links yet.\n".into());
            }
            let mut out = String::new();
            for (id, record) in workspace.records() {
                let _ = writeln!(&mut out, "{id}  {}  {}", record.keyword, record.title);
            }
            Ok(out)
        }
        LegacyCommand::Backup { dir } => {
            let dir = dir.unwrap_or_else(|| storage.backup_dir().to_path_buf());
            let path = workspace.export_backup(&dir, OffsetDateTime::now_utc().date())?;
            Ok(format!("Backup written to {}\n", path.display()))
        }
        LegacyCommand::Restore { path } => {
            let summary = workspace.import_backup(&path)?;
            Ok(format!(
                "Restored sidebar: {}, events: {}, tarajim: {}\n",
                yes_no(summary.sidebar),
                yes_no(summary.events),
                yes_no(summary.tarajim)
            ))
        }
    }
}

fn format_outline(workspace: &LegacyWorkspace) -> String {
    let outline = workspace.outline();
    if outline.years.is_empty() {
        return "The outline is empty.\n".into();
    }
    let mut out = String::new();
    for (index, year) in outline.years.iter().enumerate() {
        let _ = writeln!(&mut out, "{}. {}", index + 1, year.title);
        for event in &year.events {
            let _ = writeln!(&mut out, "    {}  {}", event.id, event.title);
        }
    }
    out
}

/// One `p` element per non-blank line.
fn paragraphs(raw: &str) -> Vec<RichNode> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| RichNode::element("p", vec![RichNode::text(line)]))
        .collect()
}

fn heading_index(number: usize) -> Result<usize> {
    match number.checked_sub(1) {
        Some(index) => Ok(index),
        None => bail!("heading numbers start at 1"),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::config::{AppConfig, ConfigPaths};
use crate::editor::{parse_year, Editor, EventForm, Placement, SaveOutcome};
use crate::ordering::{Direction, GroupKey};
use crate::search::{parse_query, search as run_search, SearchResult};
use crate::smartlinks::{dispatch, Annotator, LinkRequest, Pointer};
use crate::storage::StorageHandle;
use crate::store::DatasetStore;
use crate::sync::{self, SyncController, SyncOutcome};
use crate::timeline::{
    build_sections, prepare_insert_after, prepare_insert_before, prepare_insert_for_year,
    prepare_new_event, year_label, YearSection, EMPTY_YEAR_PLACEHOLDER,
};

#[derive(Args, Debug, Clone)]
pub struct TimelineArgs {
    /// Only list years that have events
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Event identifier
    pub id: String,
    /// Only print this source (1-based)
    #[arg(long)]
    pub source: Option<usize>,
    /// Print annotated HTML instead of plain text
    #[arg(long)]
    pub html: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommand {
    /// Create an event, optionally placed before or after another
    Add(EventAddArgs),
    /// Change an event's title or year
    Edit(EventEditArgs),
    /// Move an event up or down within its year
    Move(EventMoveArgs),
    /// Delete an event
    Delete(EventIdArgs),
    /// Replace an event's notes (reads stdin when TEXT is omitted)
    Notes(EventNotesArgs),
    /// Replace an event's tags
    Tags(EventTagsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommand,
}

#[derive(Args, Debug, Clone)]
pub struct EventAddArgs {
    /// Unique identifier for the new event
    pub id: String,
    /// Event title
    pub title: String,
    /// Hijri year; blank or non-numeric means undated. Anchored inserts take
    /// the anchor's year instead.
    #[arg(long, conflicts_with_all = ["before", "after"])]
    pub year: Option<String>,
    /// Place the new event right before this one
    #[arg(long, conflicts_with = "after")]
    pub before: Option<String>,
    /// Place the new event right after this one
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EventEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// New year; an empty string makes the event undated
    #[arg(long)]
    pub year: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EventMoveArgs {
    pub id: String,
    /// `up` or `down`
    pub direction: Direction,
}

#[derive(Args, Debug, Clone)]
pub struct EventIdArgs {
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EventNotesArgs {
    pub id: String,
    pub text: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EventTagsArgs {
    pub id: String,
    /// Tags to keep; none clears them
    pub tags: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SourceCommand {
    /// Append a source (reads stdin when TEXT is omitted)
    Add {
        event: String,
        text: Option<String>,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Remove a source by number
    Remove { event: String, number: usize },
    /// Rename the book a source comes from
    Book {
        event: String,
        number: usize,
        book: String,
    },
    /// Replace a source's text (reads stdin when TEXT is omitted)
    Text {
        event: String,
        number: usize,
        text: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PersonCommand {
    /// Create or replace a biography
    Set {
        name: String,
        #[arg(long, default_value = "")]
        short: String,
        #[arg(long, default_value = "")]
        full: String,
        #[arg(long, default_value = "")]
        img: String,
    },
    Remove { name: String },
}

#[derive(Args, Debug, Clone)]
pub struct PersonArgs {
    #[command(subcommand)]
    pub command: PersonCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PlaceCommand {
    /// Create or replace a place
    Set {
        name: String,
        #[arg(long, default_value = "")]
        desc: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    Remove { name: String },
}

#[derive(Args, Debug, Clone)]
pub struct PlaceArgs {
    #[command(subcommand)]
    pub command: PlaceCommand,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search terms (supports tag:NAME and year:N, year:A..B, year:none)
    #[arg()]
    pub query: Vec<String>,
    /// Limit the number of results printed
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// JSON file to import (reads stdin when omitted)
    pub path: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SyncCommand {
    /// Replace local data with the remote document
    Pull,
    /// Overwrite the remote document with local data
    Push,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommand,
}

/// Dataset plus the optional remote for one command invocation.
pub struct Workspace {
    config: Arc<AppConfig>,
    store: DatasetStore,
    sync: Option<SyncController>,
}

impl Workspace {
    pub fn open(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let store = DatasetStore::load(storage)?;
        let sync = sync::controller_from_options(&config.sync);
        Ok(Self {
            config,
            store,
            sync,
        })
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    fn editor(&mut self) -> Editor<'_> {
        Editor::new(&mut self.store, &self.config.glossary)
    }

    /// A one-shot process cannot wait out the debounce window, so the
    /// pending push is flushed right away.
    fn publish(&mut self) {
        let Some(sync) = self.sync.as_mut() else {
            return;
        };
        sync.note_mutation(Instant::now());
        if let Some(SyncOutcome::PushFailed(reason)) = sync.flush(&self.store, false) {
            tracing::warn!(%reason, "changes were saved locally only");
        }
    }
}

pub fn run_reader(app: &mut App) -> Result<()> {
    app.run()
}

pub fn print(output: String) -> Result<()> {
    print!("{output}");
    Ok(())
}

pub fn timeline(workspace: &Workspace, args: &TimelineArgs) -> String {
    let range = (!args.compact).then(|| workspace.config.timeline.range());
    let sections = build_sections(&workspace.store.dataset().events, range);
    format_sections(&sections)
}

fn format_sections(sections: &[YearSection]) -> String {
    if sections.is_empty() {
        return "No events yet.\n".to_string();
    }
    let mut out = String::new();
    for section in sections {
        let _ = writeln!(&mut out, "{}", section.heading());
        if section.is_placeholder() {
            let _ = writeln!(&mut out, "    {EMPTY_YEAR_PLACEHOLDER}");
        }
        for entry in &section.entries {
            let _ = writeln!(&mut out, "    {}  [{}]", entry.display(), entry.id);
        }
    }
    out
}

pub fn show(workspace: &Workspace, args: &ShowArgs) -> Result<String> {
    let dataset = workspace.store.dataset();
    let Some(event) = dataset.event(&args.id) else {
        return Ok(format!("No event with id '{}'.\n", args.id));
    };
    let only = match args.source {
        Some(number) => Some(source_index(number)?),
        None => None,
    };

    let annotator = Annotator::new(&dataset.biographies, &dataset.places);
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}  [{}]", event.title, event.id);
    let _ = writeln!(&mut out, "{}", year_label(GroupKey::of(event)));
    if !event.tags.is_empty() {
        let _ = writeln!(&mut out, "tags    {}", event.tags.join("، "));
    }
    if !event.notes.trim().is_empty() {
        let _ = writeln!(&mut out, "notes   {}", event.notes.trim());
    }

    let mut links = Vec::new();
    for (index, source) in event.sources.iter().enumerate() {
        if only.is_some_and(|only| only != index) {
            continue;
        }
        out.push('\n');
        let _ = writeln!(&mut out, "[{}] {}", index + 1, source.tab_label(index));
        if args.html {
            let _ = writeln!(&mut out, "{}", annotator.annotate(&source.text));
            continue;
        }
        for segment in annotator.segments(&source.text) {
            match segment.link {
                Some(link) => {
                    let _ = write!(&mut out, "[{}]", segment.text);
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
                None => out.push_str(&segment.text),
            }
        }
        out.push('\n');
    }

    if !links.is_empty() {
        let _ = writeln!(&mut out, "\nlinks");
        for link in &links {
            let detail = match dispatch(link, Pointer::Enter, &dataset.biographies, &dataset.places)
            {
                Some(LinkRequest::ShowTooltip(text)) => text,
                _ => link.name.clone(),
            };
            let _ = writeln!(&mut out, "  {:<6} {detail}", link.kind.as_ref());
        }
    }
    Ok(out)
}

pub fn handle_event(workspace: &mut Workspace, args: EventArgs) -> Result<String> {
    match args.command {
        EventCommand::Add(args) => event_add(workspace, args),
        EventCommand::Edit(args) => event_edit(workspace, args),
        EventCommand::Move(args) => {
            let moved = workspace.editor().move_event(&args.id, args.direction)?;
            if !moved {
                return Ok(format!(
                    "Event '{}' cannot move {} (unknown id or already at the edge).\n",
                    args.id, args.direction
                ));
            }
            workspace.publish();
            Ok(format!("Moved event '{}' {}.\n", args.id, args.direction))
        }
        EventCommand::Delete(args) => {
            if !workspace.editor().delete_event(&args.id)? {
                return Ok(missing_event(&args.id));
            }
            workspace.publish();
            Ok(format!("Deleted event '{}'.\n", args.id))
        }
        EventCommand::Notes(args) => {
            let text = match args.text {
                Some(text) => text,
                None => read_stdin()?.unwrap_or_default(),
            };
            if !workspace.editor().set_notes(&args.id, text.trim_end())? {
                return Ok(missing_event(&args.id));
            }
            workspace.publish();
            Ok(format!("Updated notes for '{}'.\n", args.id))
        }
        EventCommand::Tags(args) => {
            if !workspace.editor().set_tags(&args.id, &args.tags)? {
                return Ok(missing_event(&args.id));
            }
            workspace.publish();
            let tags = workspace
                .store
                .dataset()
                .event(&args.id)
                .map(|event| event.tags.join("، "))
                .unwrap_or_default();
            Ok(format!("Tags for '{}': {tags}\n", args.id))
        }
    }
}

fn event_add(workspace: &mut Workspace, args: EventAddArgs) -> Result<String> {
    let events = &workspace.store.dataset().events;
    let anchor = args.before.as_deref().or(args.after.as_deref());
    let draft = match (&args.before, &args.after) {
        (Some(anchor), _) => prepare_insert_before(events, anchor),
        (None, Some(anchor)) => prepare_insert_after(events, anchor),
        (None, None) => Some(match args.year.as_deref().and_then(parse_year) {
            Some(year) => prepare_insert_for_year(GroupKey::Year(year)),
            None => prepare_new_event(None),
        }),
    };
    let Some(mut draft) = draft else {
        return Ok(missing_event(anchor.unwrap_or_default()));
    };
    draft.form.id = args.id;
    draft.form.title = args.title;
    if let Some(year) = args.year {
        draft.form.year = year;
    }
    let placement = draft
        .pending
        .map(|slot| slot.placement)
        .unwrap_or(Placement::End);

    let Some(outcome) = workspace.editor().create_event(&draft.form, &placement)? else {
        return Ok(missing_event(anchor.unwrap_or_default()));
    };
    workspace.publish();
    Ok(describe_save(workspace, &outcome))
}

fn event_edit(workspace: &mut Workspace, args: EventEditArgs) -> Result<String> {
    let Some(event) = workspace.store.dataset().event(&args.id) else {
        return Ok(missing_event(&args.id));
    };
    let mut form = EventForm::from_event(event);
    if let Some(title) = args.title {
        form.title = title;
    }
    if let Some(year) = args.year {
        form.year = year;
    }
    let outcome = workspace.editor().save_event(&form, None)?;
    workspace.publish();
    Ok(describe_save(workspace, &outcome))
}

fn describe_save(workspace: &Workspace, outcome: &SaveOutcome) -> String {
    let dataset = workspace.store.dataset();
    let placement = dataset
        .event(outcome.id())
        .map(|event| {
            format!(
                "{} #{}",
                year_label(GroupKey::of(event)),
                event.order.unwrap_or_default()
            )
        })
        .unwrap_or_default();
    match outcome {
        SaveOutcome::Created { id, .. } => format!("Created event '{id}' ({placement}).\n"),
        SaveOutcome::Updated { id, .. } => format!("Updated event '{id}' ({placement}).\n"),
    }
}

pub fn handle_source(workspace: &mut Workspace, args: SourceArgs) -> Result<String> {
    let output = match args.command {
        SourceCommand::Add { event, text, title } => {
            let text = text_or_stdin(text)?;
            match workspace.editor().add_source(&event, &title, &text)? {
                Some(index) => format!("Added source {} to '{event}'.\n", index + 1),
                None => return Ok(missing_event(&event)),
            }
        }
        SourceCommand::Remove { event, number } => {
            let index = source_index(number)?;
            match workspace.editor().remove_source(&event, index)? {
                Some(next) => format!(
                    "Removed source {number} from '{event}'; showing source {}.\n",
                    next + 1
                ),
                None => return Ok(missing_event(&event)),
            }
        }
        SourceCommand::Book {
            event,
            number,
            book,
        } => {
            let index = source_index(number)?;
            if !workspace.editor().rename_source_book(&event, index, &book)? {
                return Ok(missing_event(&event));
            }
            format!("Renamed source {number} of '{event}'.\n")
        }
        SourceCommand::Text {
            event,
            number,
            text,
        } => {
            let index = source_index(number)?;
            let text = text_or_stdin(text)?;
            if !workspace.editor().set_source_text(&event, index, &text)? {
                return Ok(missing_event(&event));
            }
            format!("Updated source {number} of '{event}'.\n")
        }
    };
    workspace.publish();
    Ok(output)
}

pub fn handle_person(workspace: &mut Workspace, args: PersonArgs) -> Result<String> {
    let output = match args.command {
        PersonCommand::Set {
            name,
            short,
            full,
            img,
        } => {
            workspace.editor().save_person(&name, &short, &full, &img)?;
            format!("Saved biography '{}'.\n", name.trim())
        }
        PersonCommand::Remove { name } => {
            if !workspace.editor().remove_person(&name)? {
                return Ok(format!("No biography named '{name}'.\n"));
            }
            format!("Removed biography '{name}'.\n")
        }
    };
    workspace.publish();
    Ok(output)
}

pub fn handle_place(workspace: &mut Workspace, args: PlaceArgs) -> Result<String> {
    let output = match args.command {
        PlaceCommand::Set { name, desc, image } => {
            workspace.editor().save_place(&name, &desc, &image)?;
            format!("Saved place '{}'.\n", name.trim())
        }
        PlaceCommand::Remove { name } => {
            if !workspace.editor().remove_place(&name)? {
                return Ok(format!("No place named '{name}'.\n"));
            }
            format!("Removed place '{name}'.\n")
        }
    };
    workspace.publish();
    Ok(output)
}

pub fn search(workspace: &Workspace, args: &SearchArgs) -> Result<String> {
    let raw_query = args.query.join(" ");
    let query = parse_query(raw_query.trim());
    if query.is_empty() {
        bail!("search query must contain terms or filters");
    }
    let limit = args.limit.unwrap_or(workspace.config.search.max_results);
    let results = run_search(workspace.store.dataset(), &query, limit);
    Ok(format_search_results(&results))
}

fn format_search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No matches found.\n".to_string();
    }
    let mut out = String::new();
    for result in results {
        let _ = writeln!(&mut out, "[{}] {}", result.kind, result.title);
        if result.id != result.title {
            let _ = writeln!(&mut out, "    id      {}", result.id);
        }
        if !result.meta.is_empty() {
            let _ = writeln!(&mut out, "    {}", result.meta);
        }
    }
    out
}

pub fn export(workspace: &Workspace, args: &ExportArgs) -> Result<String> {
    let json = workspace.store.export_json()?;
    match &args.output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            Ok(format!(
                "Exported {} events to {}\n",
                workspace.store.dataset().events.len(),
                path.display()
            ))
        }
        None => Ok(format!("{json}\n")),
    }
}

pub fn import(workspace: &mut Workspace, args: &ImportArgs) -> Result<String> {
    let raw = match &args.path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => match read_stdin()? {
            Some(raw) => raw,
            None => bail!("pass a file or pipe JSON on stdin"),
        },
    };
    workspace.store.import_json(&raw)?;
    workspace.publish();
    let dataset = workspace.store.dataset();
    Ok(format!(
        "Imported {} events, {} biographies, {} places.\n",
        dataset.events.len(),
        dataset.biographies.len(),
        dataset.places.len()
    ))
}

pub fn reset(workspace: &mut Workspace) -> Result<String> {
    workspace.store.reset()?;
    workspace.publish();
    Ok("Restored the default dataset.\n".to_string())
}

pub fn handle_sync(workspace: &mut Workspace, args: SyncArgs) -> Result<String> {
    let Some(sync) = workspace.sync.as_mut() else {
        return Ok("No remote configured (set sync.remote_path in the config file).\n".into());
    };
    let remote = sync.remote().describe();
    let outcome = match args.command {
        SyncCommand::Pull => sync.pull_now(&mut workspace.store),
        SyncCommand::Push => sync
            .flush(&workspace.store, true)
            .unwrap_or(SyncOutcome::Pushed),
    };
    Ok(match outcome {
        SyncOutcome::Pulled { applied: true } => format!("Pulled dataset from {remote}.\n"),
        SyncOutcome::Pulled { applied: false } => {
            format!("Remote {remote} is empty or invalid; local data kept.\n")
        }
        SyncOutcome::Pushed => format!("Pushed dataset to {remote}.\n"),
        SyncOutcome::PullFailed(reason) => format!("Pull failed: {reason}\n"),
        SyncOutcome::PushFailed(reason) => format!("Push failed: {reason}\n"),
    })
}

pub fn status(paths: &ConfigPaths, storage: &StorageHandle) -> Result<String> {
    let store = DatasetStore::load(storage.clone())?;
    let dataset = store.dataset();
    let wal = storage
        .run_wal_health_check()
        .context("running WAL health check")?;
    let backups = storage.list_backups(5)?;

    let mut out = String::new();
    let _ = writeln!(&mut out, "config    {}", paths.config_file.display());
    let _ = writeln!(&mut out, "data      {}", paths.data_dir.display());
    let _ = writeln!(&mut out, "database  {}", storage.database_path().display());
    let _ = writeln!(&mut out, "backups   {}", storage.backup_dir().display());
    let _ = writeln!(
        &mut out,
        "dataset   {} events, {} biographies, {} places",
        dataset.events.len(),
        dataset.biographies.len(),
        dataset.places.len()
    );
    let _ = writeln!(
        &mut out,
        "wal       {} frames, {} checkpointed, {} busy",
        wal.wal_frames, wal.checkpointed_frames, wal.busy_frames
    );
    for backup in backups {
        let _ = writeln!(
            &mut out,
            "  backup #{} {} {}",
            backup.id,
            format_timestamp(backup.created_at),
            backup.path.display()
        );
    }
    Ok(out)
}

fn missing_event(id: &str) -> String {
    format!("No event with id '{id}'; nothing changed.\n")
}

/// Converts a 1-based source number from the command line.
fn source_index(number: usize) -> Result<usize> {
    match number.checked_sub(1) {
        Some(index) => Ok(index),
        None => bail!("source numbers start at 1"),
    }
}

fn text_or_stdin(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => Ok(read_stdin()?.unwrap_or_default()),
    }
}

pub(crate) fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

pub(crate) fn format_timestamp(epoch: i64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map(|dt| dt.format(&Rfc3339).unwrap_or_else(|_| epoch.to_string()))
        .unwrap_or_else(|_| epoch.to_string())
}

use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::reader::ReaderSession;
use crate::search::{self, ResultKind};
use crate::smartlinks::{LinkRequest, Pointer};
use crate::storage::StorageHandle;
use crate::store::DatasetStore;
use crate::sync::{self, SyncController, SyncOutcome};
use crate::ui;

pub mod state;

pub use state::{AppState, OverlayState, ResultsState};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    NextSource,
    NextLink,
    PreviousLink,
    OpenLink,
    ClearLink,
    StartSearch,
    Pull,
    ShowHelp,
}

pub struct App {
    pub config: Arc<AppConfig>,
    session: ReaderSession,
    sync: Option<SyncController>,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let store = DatasetStore::load(storage).context("loading dataset for the reader")?;
        let session = ReaderSession::new(store);
        let mut sync = sync::controller_from_options(&config.sync);
        let mut state = AppState::default();
        if let Some(controller) = sync.as_mut() {
            if config.sync.pull_on_start {
                controller.request_pull();
                state.set_status_message(Some("Pulling from remote...".into()));
            }
        }
        Ok(Self {
            config,
            session,
            sync,
            state,
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn session(&self) -> &ReaderSession {
        &self.session
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| ui::draw_app(frame, &self.session, &self.state, &mut self.list_state))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.is_search_active() {
            match key.code {
                KeyCode::Esc => self.state.cancel_search(),
                KeyCode::Enter => self.run_search(),
                KeyCode::Backspace => self.state.pop_search_char(),
                KeyCode::Char(ch)
                    if !key.modifiers.intersects(
                        KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                    ) =>
                {
                    self.state.push_search_char(ch)
                }
                _ => {}
            }
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Tab => Some(Action::NextSource),
            KeyCode::Char('l') | KeyCode::Right if plain => Some(Action::NextLink),
            KeyCode::Char('h') | KeyCode::Left if plain => Some(Action::PreviousLink),
            KeyCode::Enter => Some(Action::OpenLink),
            KeyCode::Esc => Some(Action::ClearLink),
            KeyCode::Char('/') if plain => Some(Action::StartSearch),
            KeyCode::Char('p') if plain => Some(Action::Pull),
            KeyCode::Char('?') => Some(Action::ShowHelp),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => {
                self.session.select_next();
                self.state.clear_link_focus();
            }
            Action::SelectPrevious => {
                self.session.select_previous();
                self.state.clear_link_focus();
            }
            Action::NextSource => {
                self.session.next_source();
                self.state.clear_link_focus();
            }
            Action::NextLink => {
                let count = self.session.links().len();
                self.state.focus_next_link(count);
                self.hover_focused_link();
            }
            Action::PreviousLink => {
                let count = self.session.links().len();
                self.state.focus_previous_link(count);
                self.hover_focused_link();
            }
            Action::OpenLink => self.open_focused_link(),
            Action::ClearLink => self.state.clear_link_focus(),
            Action::StartSearch => self.state.begin_search(),
            Action::Pull => match self.sync.as_mut() {
                Some(controller) => {
                    controller.request_pull();
                    self.state
                        .set_status_message(Some("Pulling from remote...".into()));
                }
                None => self
                    .state
                    .set_status_message(Some("No remote configured.".into())),
            },
            Action::ShowHelp => self.state.show_overlay(OverlayState::Help),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let Some(overlay) = self.state.overlay() else {
            return false;
        };
        let in_results = matches!(overlay, OverlayState::SearchResults(_));
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.state.close_overlay(),
            KeyCode::Char('j') | KeyCode::Down if in_results => {
                self.state.move_result_selection(1)
            }
            KeyCode::Char('k') | KeyCode::Up if in_results => {
                self.state.move_result_selection(-1)
            }
            KeyCode::Enter if in_results => self.open_selected_result(),
            KeyCode::Enter => self.state.close_overlay(),
            _ => {}
        }
        true
    }

    fn hover_focused_link(&mut self) {
        let Some(index) = self.state.link_focus() else {
            return;
        };
        let links = self.session.links();
        let request = links
            .get(index)
            .and_then(|link| self.session.pointer(link, Pointer::Enter));
        match request {
            Some(request) => self.state.apply_link_request(request),
            None => self.state.apply_link_request(LinkRequest::HideTooltip),
        }
    }

    fn open_focused_link(&mut self) {
        let Some(index) = self.state.link_focus() else {
            self.state
                .set_status_message(Some("Focus a link with h/l first.".into()));
            return;
        };
        let links = self.session.links();
        let Some(link) = links.get(index) else {
            return;
        };
        match self.session.pointer(link, Pointer::Click) {
            Some(request) => self.state.apply_link_request(request),
            None => self.state.set_status_message(Some(format!(
                "'{}' is no longer in the glossary.",
                link.name
            ))),
        }
    }

    fn run_search(&mut self) {
        let input = self.state.finish_search();
        let query = search::parse_query(&input);
        if query.is_empty() {
            return;
        }
        let results = search::search(
            self.session.dataset(),
            &query,
            self.config.search.max_results,
        );
        tracing::debug!(query = %input, hits = results.len(), "reader search");
        self.state.show_results(input, results);
    }

    fn open_selected_result(&mut self) {
        let Some(result) = self.state.selected_result().cloned() else {
            self.state.close_overlay();
            return;
        };
        let dataset = self.session.dataset();
        let overlay = match result.kind {
            ResultKind::Event => None,
            ResultKind::Person => dataset.biographies.get(&result.id).map(|biography| {
                OverlayState::Person {
                    name: result.id.clone(),
                    biography: biography.clone(),
                }
            }),
            ResultKind::Place => {
                dataset
                    .places
                    .get(&result.id)
                    .map(|place| OverlayState::Place {
                        name: result.id.clone(),
                        place: place.clone(),
                    })
            }
        };
        match overlay {
            Some(overlay) => self.state.show_overlay(overlay),
            None => {
                self.state.close_overlay();
                if self.session.select(&result.id) {
                    self.state.clear_link_focus();
                }
            }
        }
    }

    fn on_tick(&mut self) {
        if let Some(controller) = self.sync.as_mut() {
            for outcome in controller.tick(self.session.store_mut(), Instant::now()) {
                let message = match outcome {
                    SyncOutcome::Pulled { applied: true } => "Pulled the latest dataset.".into(),
                    SyncOutcome::Pulled { applied: false } => {
                        "Remote had no usable dataset; kept the local copy.".into()
                    }
                    SyncOutcome::Pushed => "Pushed to remote.".into(),
                    SyncOutcome::PullFailed(err) => {
                        tracing::warn!(%err, "reader pull failed");
                        format!("Pull failed: {err}")
                    }
                    SyncOutcome::PushFailed(err) => {
                        tracing::warn!(%err, "reader push failed");
                        format!("Push failed: {err}")
                    }
                };
                self.state.set_status_message(Some(message));
            }
        }
        if self.session.refresh() {
            let count = self.session.links().len();
            self.state.clamp_link_focus(count);
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("creating terminal backend")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leaving alternate screen")?;
    terminal.show_cursor().context("restoring cursor")?;
    Ok(())
}

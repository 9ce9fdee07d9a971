use crate::model::{Biography, Place};
use crate::search::SearchResult;
use crate::smartlinks::LinkRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Person { name: String, biography: Biography },
    Place { name: String, place: Place },
    SearchResults(ResultsState),
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsState {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub selected: usize,
}

impl ResultsState {
    pub fn selected(&self) -> Option<&SearchResult> {
        self.results.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) {
        if self.results.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.results.len() - 1;
        self.selected = self
            .selected
            .checked_add_signed(delta)
            .map(|index| index.min(last))
            .unwrap_or(0);
    }
}

#[derive(Debug, Clone, Default)]
struct SearchPrompt {
    active: bool,
    query: String,
}

/// Everything the reader screen shows beyond the dataset itself.
#[derive(Debug, Default)]
pub struct AppState {
    link_focus: Option<usize>,
    tooltip: Option<String>,
    overlay: Option<OverlayState>,
    prompt: SearchPrompt,
    status_message: Option<String>,
}

impl AppState {
    pub fn link_focus(&self) -> Option<usize> {
        self.link_focus
    }

    /// Moves link focus forward through `count` links, wrapping at the end.
    pub fn focus_next_link(&mut self, count: usize) -> Option<usize> {
        self.link_focus = match (count, self.link_focus) {
            (0, _) => None,
            (_, None) => Some(0),
            (count, Some(index)) => Some((index + 1) % count),
        };
        self.link_focus
    }

    pub fn focus_previous_link(&mut self, count: usize) -> Option<usize> {
        self.link_focus = match (count, self.link_focus) {
            (0, _) => None,
            (count, None) | (count, Some(0)) => Some(count - 1),
            (_, Some(index)) => Some(index - 1),
        };
        self.link_focus
    }

    /// Drops link focus and the tooltip that went with it.
    pub fn clear_link_focus(&mut self) {
        self.link_focus = None;
        self.tooltip = None;
    }

    /// Keeps focus only while it still points at one of `count` links.
    pub fn clamp_link_focus(&mut self, count: usize) {
        if self.link_focus.is_some_and(|index| index >= count) {
            self.clear_link_focus();
        }
    }

    pub fn apply_link_request(&mut self, request: LinkRequest) {
        match request {
            LinkRequest::ShowTooltip(text) => self.tooltip = Some(text),
            LinkRequest::HideTooltip => self.tooltip = None,
            LinkRequest::OpenPerson { name, biography } => {
                self.overlay = Some(OverlayState::Person { name, biography });
            }
            LinkRequest::OpenPlace { name, place } => {
                self.overlay = Some(OverlayState::Place { name, place });
            }
        }
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn show_overlay(&mut self, overlay: OverlayState) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn begin_search(&mut self) {
        self.prompt.active = true;
        self.prompt.query.clear();
    }

    pub fn is_search_active(&self) -> bool {
        self.prompt.active
    }

    pub fn search_query(&self) -> &str {
        &self.prompt.query
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.prompt.query.push(ch);
    }

    pub fn pop_search_char(&mut self) {
        self.prompt.query.pop();
    }

    pub fn cancel_search(&mut self) {
        self.prompt = SearchPrompt::default();
    }

    /// Closes the prompt and hands back what was typed.
    pub fn finish_search(&mut self) -> String {
        self.prompt.active = false;
        std::mem::take(&mut self.prompt.query)
    }

    pub fn show_results(&mut self, query: String, results: Vec<SearchResult>) {
        if results.is_empty() {
            self.set_status_message(Some(format!("No matches for '{query}'.")));
            return;
        }
        self.set_status_message(Some(format!("{} match(es) for '{query}'.", results.len())));
        self.overlay = Some(OverlayState::SearchResults(ResultsState {
            query,
            results,
            selected: 0,
        }));
    }

    pub fn move_result_selection(&mut self, delta: isize) {
        if let Some(OverlayState::SearchResults(results)) = self.overlay.as_mut() {
            results.move_selection(delta);
        }
    }

    pub fn selected_result(&self) -> Option<&SearchResult> {
        match self.overlay.as_ref() {
            Some(OverlayState::SearchResults(results)) => results.selected(),
            _ => None,
        }
    }

    pub fn set_status_message(&mut self, message: Option<String>) {
        self.status_message = message;
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ResultKind;
    use assert_matches::assert_matches;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            kind: ResultKind::Event,
            id: id.into(),
            title: id.into(),
            meta: String::new(),
        }
    }

    #[test]
    fn link_focus_wraps_both_ways() {
        let mut state = AppState::default();
        assert_eq!(state.focus_next_link(0), None);
        assert_eq!(state.focus_next_link(3), Some(0));
        assert_eq!(state.focus_next_link(3), Some(1));
        assert_eq!(state.focus_next_link(3), Some(2));
        assert_eq!(state.focus_next_link(3), Some(0));
        assert_eq!(state.focus_previous_link(3), Some(2));

        state.clear_link_focus();
        assert_eq!(state.focus_previous_link(2), Some(1));
        state.clamp_link_focus(1);
        assert_eq!(state.link_focus(), None);
    }

    #[test]
    fn link_requests_drive_tooltip_and_overlay() {
        let mut state = AppState::default();
        state.apply_link_request(LinkRequest::ShowTooltip("أحد — جبل".into()));
        assert_eq!(state.tooltip(), Some("أحد — جبل"));
        state.apply_link_request(LinkRequest::HideTooltip);
        assert_eq!(state.tooltip(), None);

        state.apply_link_request(LinkRequest::OpenPlace {
            name: "أحد".into(),
            place: Place {
                desc: "جبل".into(),
                image: String::new(),
            },
        });
        assert_matches!(state.overlay(), Some(OverlayState::Place { name, .. }) if name == "أحد");
        state.close_overlay();
        assert!(state.overlay().is_none());
    }

    #[test]
    fn search_prompt_collects_and_resets() {
        let mut state = AppState::default();
        state.begin_search();
        assert!(state.is_search_active());
        for ch in "بدرx".chars() {
            state.push_search_char(ch);
        }
        state.pop_search_char();
        assert_eq!(state.search_query(), "بدر");
        assert_eq!(state.finish_search(), "بدر");
        assert!(!state.is_search_active());
        assert_eq!(state.search_query(), "");
    }

    #[test]
    fn results_overlay_clamps_selection() {
        let mut state = AppState::default();
        state.show_results("x".into(), Vec::new());
        assert!(state.overlay().is_none());
        assert_eq!(state.status_message(), Some("No matches for 'x'."));

        state.show_results("e".into(), vec![result("a"), result("b")]);
        state.move_result_selection(-1);
        assert_eq!(state.selected_result().map(|r| r.id.as_str()), Some("a"));
        state.move_result_selection(5);
        assert_eq!(state.selected_result().map(|r| r.id.as_str()), Some("b"));
        assert_eq!(state.status_message(), Some("2 match(es) for 'e'."));
    }
}

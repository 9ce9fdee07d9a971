use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, OverlayState, ResultsState};
use crate::ordering::GroupKey;
use crate::reader::ReaderSession;
use crate::smartlinks::{LinkKind, Segment};
use crate::timeline::{year_label, DetailView, YearSection};

const EMPTY_TIMELINE: &str = "No events yet.";
const KEY_HINTS: &str = "j/k event • Tab source • h/l link • Enter open • / search • p pull • ? help • q quit";

pub fn draw_app(frame: &mut Frame, session: &ReaderSession, state: &AppState, list_state: &mut ListState) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(vertical[0]);

    draw_timeline(frame, session, list_state, columns[0]);
    draw_detail(frame, session, state, columns[1]);

    let status = Paragraph::new(build_status_line(state))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state);
}

fn draw_timeline(frame: &mut Frame, session: &ReaderSession, list_state: &mut ListState, area: Rect) {
    let width = usize::from(area.width.saturating_sub(4));
    let selected = session.selection().event_id();
    let rows = timeline_rows(session.sections(), width);
    list_state.select(selected.and_then(|id| {
        rows.iter()
            .position(|row| row.event_id.as_deref() == Some(id))
    }));

    let mut items: Vec<ListItem> = rows
        .into_iter()
        .map(|row| match row.event_id {
            Some(_) => ListItem::new(row.label),
            None => ListItem::new(Line::from(Span::styled(
                row.label,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ))),
        })
        .collect();
    if items.is_empty() {
        items.push(ListItem::new(EMPTY_TIMELINE));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .title("Timeline")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn draw_detail(frame: &mut Frame, session: &ReaderSession, state: &AppState, area: Rect) {
    let detail = session.detail();
    let block = Block::default()
        .title(detail.title().to_string())
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let DetailView::Event {
        event,
        source_index,
    } = detail
    else {
        return;
    };

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(inner);

    let mut meta = vec![Span::styled(
        year_label(GroupKey::from(event.year)),
        Style::default().fg(Color::Gray),
    )];
    if !event.tags.is_empty() {
        meta.push(Span::raw("  "));
        meta.push(Span::styled(
            event
                .tags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" "),
            Style::default().fg(Color::Magenta),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(meta)), parts[0]);

    let tabs = Tabs::new(session.source_tabs())
        .select(source_index)
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )
        .divider("|");
    frame.render_widget(tabs, parts[1]);

    let body = Paragraph::new(Text::from(segment_lines(
        &session.segments(),
        state.link_focus(),
    )))
    .wrap(Wrap { trim: false });
    frame.render_widget(body, parts[2]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimelineRow {
    /// `None` for section headings.
    event_id: Option<String>,
    label: String,
}

fn timeline_rows(sections: &[YearSection], width: usize) -> Vec<TimelineRow> {
    let mut rows = Vec::new();
    for section in sections {
        rows.push(TimelineRow {
            event_id: None,
            label: truncate_to_width(&section.heading(), width),
        });
        for entry in &section.entries {
            rows.push(TimelineRow {
                event_id: Some(entry.id.clone()),
                label: truncate_to_width(&format!("  {}", entry.display()), width),
            });
        }
    }
    rows
}

/// Cuts `text` at a grapheme boundary so it fits `width` columns, marking the
/// cut with an ellipsis.
fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let grapheme_width = grapheme.width();
        if used + grapheme_width + 1 > width {
            break;
        }
        out.push_str(grapheme);
        used += grapheme_width;
    }
    out.push('…');
    out
}

fn link_style(kind: LinkKind, focused: bool) -> Style {
    let color = match kind {
        LinkKind::Person => Color::Cyan,
        LinkKind::Place => Color::Green,
    };
    let style = Style::default().fg(color).add_modifier(Modifier::UNDERLINED);
    if focused {
        style.add_modifier(Modifier::REVERSED | Modifier::BOLD)
    } else {
        style
    }
}

/// Splits annotated runs into display lines, styling links and reversing the
/// `focus`-th one.
fn segment_lines(segments: &[Segment], focus: Option<usize>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut link_index = 0;
    for segment in segments {
        let style = match &segment.link {
            Some(link) => {
                let focused = focus == Some(link_index);
                link_index += 1;
                link_style(link.kind, focused)
            }
            None => Style::default(),
        };
        let mut pieces = segment.text.split('\n');
        if let Some(first) = pieces.next() {
            if !first.is_empty() {
                current.push(Span::styled(first.to_string(), style));
            }
        }
        for piece in pieces {
            lines.push(Line::from(std::mem::take(&mut current)));
            if !piece.is_empty() {
                current.push(Span::styled(piece.to_string(), style));
            }
        }
    }
    lines.push(Line::from(current));
    lines
}

fn build_status_line(state: &AppState) -> Text<'static> {
    if state.is_search_active() {
        let mut query = state.search_query().to_string();
        query.push('▌');
        return Text::from(Line::from(vec![
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(query),
        ]));
    }
    if let Some(tooltip) = state.tooltip() {
        return Text::from(Line::from(Span::styled(
            tooltip.to_string(),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow),
        )));
    }
    if let Some(message) = state.status_message() {
        return Text::from(Line::from(vec![
            Span::styled(message.to_string(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" | "),
            Span::styled(KEY_HINTS, Style::default().fg(Color::Gray)),
        ]));
    }
    Text::from(Line::from(Span::styled(
        KEY_HINTS,
        Style::default().fg(Color::Gray),
    )))
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(OverlayState::Person { name, biography }) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    biography.short.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
            ];
            lines.extend(biography.full.lines().map(|line| Line::from(line.to_string())));
            if !biography.img.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    biography.img.clone(),
                    Style::default().fg(Color::Gray),
                )));
            }
            render_card(frame, name, lines, Color::Cyan);
        }
        Some(OverlayState::Place { name, place }) => {
            let mut lines: Vec<Line> = place
                .desc
                .lines()
                .map(|line| Line::from(line.to_string()))
                .collect();
            if !place.image.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    place.image.clone(),
                    Style::default().fg(Color::Gray),
                )));
            }
            render_card(frame, name, lines, Color::Green);
        }
        Some(OverlayState::SearchResults(results)) => render_results(frame, results),
        Some(OverlayState::Help) => {
            let lines = [
                ("j / k", "next / previous event"),
                ("Tab", "next source"),
                ("h / l", "previous / next link"),
                ("Enter", "open the focused link"),
                ("Esc", "clear link focus, close a popup"),
                ("/", "search (tag:x and year:a..b filters)"),
                ("p", "pull from the remote"),
                ("q", "quit"),
            ]
            .into_iter()
            .map(|(key, what)| {
                Line::from(vec![
                    Span::styled(
                        format!("{key:<8}"),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(what),
                ])
            })
            .collect();
            render_card(frame, "Keys", lines, Color::Cyan);
        }
        None => {}
    }
}

fn render_card(frame: &mut Frame, title: &str, mut lines: Vec<Line<'static>>, accent: Color) {
    let area = centered_rect(60, 50, frame.size());
    frame.render_widget(Clear, area);
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Esc to close",
        Style::default().fg(Color::Gray),
    )));
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, results: &ResultsState) {
    let area = centered_rect(70, 60, frame.size());
    frame.render_widget(Clear, area);
    let width = usize::from(area.width.saturating_sub(4));
    let items: Vec<ListItem> = results
        .results
        .iter()
        .map(|result| {
            let kind = format!("[{}] ", result.kind);
            let title_width = width.saturating_sub(kind.width());
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(kind, Style::default().fg(Color::Gray)),
                    Span::styled(
                        truncate_to_width(&result.title, title_width),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(Span::styled(
                    format!("    {}", result.meta),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect();
    let mut list_state = ListState::default();
    list_state.select(Some(results.selected));
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Results for '{}'", results.query))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smartlinks::Link;
    use crate::timeline::build_sections;
    use crate::model::Event;

    fn plain(text: &str) -> Segment {
        Segment {
            text: text.into(),
            link: None,
        }
    }

    fn place(name: &str) -> Segment {
        Segment {
            text: name.into(),
            link: Some(Link {
                kind: LinkKind::Place,
                name: name.into(),
            }),
        }
    }

    #[test]
    fn truncation_respects_graphemes_and_width() {
        assert_eq!(truncate_to_width("بدر", 10), "بدر");
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("e\u{301}e\u{301}e\u{301}", 2), "e\u{301}…");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn segments_split_on_newlines_and_mark_focus() {
        let segments = vec![plain("عند "), place("بدر"), plain("\nثم "), place("أحد")];
        let lines = segment_lines(&segments, Some(1));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].spans.len(), 2);
        assert!(!lines[0].spans[1]
            .style
            .add_modifier
            .contains(Modifier::REVERSED));
        let focused = &lines[1].spans[1];
        assert_eq!(focused.content, "أحد");
        assert!(focused.style.add_modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn timeline_rows_interleave_headings() {
        let events = vec![
            Event::new("a", "بدر", Some(2)),
            Event::new("b", "أحد", Some(3)),
        ];
        let rows = timeline_rows(&build_sections(&events, None), 40);
        let ids: Vec<Option<&str>> = rows.iter().map(|row| row.event_id.as_deref()).collect();
        assert_eq!(ids, vec![None, Some("a"), None, Some("b")]);
        assert!(rows[0].label.starts_with("1. "));
    }
}

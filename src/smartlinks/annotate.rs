use std::ops::Range;

use strum::{AsRefStr, Display};

use super::matcher::{Match, Matcher};
use crate::model::{Biographies, Places};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LinkKind {
    Person,
    Place,
}

impl LinkKind {
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Person => "person-link",
            Self::Place => "place-link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub kind: LinkKind,
    pub name: String,
}

/// A run of source text, optionally recognised as a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub link: Option<Link>,
}

/// Both vocabularies compiled once, for renderers that annotate repeatedly.
#[derive(Debug, Default)]
pub struct Annotator {
    people: Matcher,
    places: Matcher,
}

impl Annotator {
    pub fn new(people: &Biographies, places: &Places) -> Self {
        Self {
            people: Matcher::new(people.keys()),
            places: Matcher::new(places.keys()),
        }
    }

    /// People claim their spans first; place names are only looked for in
    /// what is left.
    pub fn links(&self, text: &str) -> Vec<(Match, LinkKind)> {
        let people = self.people.find(text);
        let claimed: Vec<Range<usize>> = people.iter().map(Match::range).collect();
        let places = self.places.find_excluding(text, &claimed);

        let mut links: Vec<(Match, LinkKind)> = people
            .into_iter()
            .map(|found| (found, LinkKind::Person))
            .chain(places.into_iter().map(|found| (found, LinkKind::Place)))
            .collect();
        links.sort_by_key(|(found, _)| found.start);
        links
    }

    pub fn segments(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for (found, kind) in self.links(text) {
            if found.start > cursor {
                segments.push(Segment {
                    text: text[cursor..found.start].to_string(),
                    link: None,
                });
            }
            segments.push(Segment {
                text: text[found.range()].to_string(),
                link: Some(Link {
                    kind,
                    name: found.key,
                }),
            });
            cursor = found.end;
        }
        if cursor < text.len() {
            segments.push(Segment {
                text: text[cursor..].to_string(),
                link: None,
            });
        }
        segments
    }

    /// Escaped HTML with every recognised name wrapped in a link span and
    /// newlines turned into `<br>`.
    pub fn annotate(&self, text: &str) -> String {
        let mut html = String::with_capacity(text.len() + text.len() / 2);
        for segment in self.segments(text) {
            let body = escape_html(&segment.text).replace('\n', "<br>");
            match segment.link {
                Some(link) => {
                    html.push_str("<span class=\"");
                    html.push_str(link.kind.class_name());
                    html.push_str("\" data-");
                    html.push_str(link.kind.as_ref());
                    html.push_str("=\"");
                    html.push_str(&escape_attr(&link.name));
                    html.push_str("\">");
                    html.push_str(&body);
                    html.push_str("</span>");
                }
                None => html.push_str(&body),
            }
        }
        html
    }
}

/// One-shot helper over [`Annotator`].
pub fn annotate(text: &str, people: &Biographies, places: &Places) -> String {
    Annotator::new(people, places).annotate(text)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

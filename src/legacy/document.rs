use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::LinkRecord;
use crate::smartlinks::{escape_attr, escape_html, Matcher};

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// A rich-text node as edited in the legacy surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichNode {
    Text {
        text: String,
    },
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        attrs: IndexMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<RichNode>,
    },
    Link {
        link_id: String,
        text: String,
    },
}

impl RichNode {
    pub fn text(text: impl Into<String>) -> Self {
        RichNode::Text { text: text.into() }
    }

    pub fn element(tag: impl Into<String>, children: Vec<RichNode>) -> Self {
        RichNode::Element {
            tag: tag.into(),
            attrs: IndexMap::new(),
            children,
        }
    }

    pub fn link(link_id: impl Into<String>, text: impl Into<String>) -> Self {
        RichNode::Link {
            link_id: link_id.into(),
            text: text.into(),
        }
    }
}

/// Concatenated text content, links included.
pub fn plain_text(nodes: &[RichNode]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[RichNode], out: &mut String) {
    for node in nodes {
        match node {
            RichNode::Text { text } | RichNode::Link { text, .. } => out.push_str(text),
            RichNode::Element { children, .. } => collect_text(children, out),
        }
    }
}

/// Replaces every link with its bare text, at any depth.
pub fn unwrap_links(nodes: &mut [RichNode]) {
    for node in nodes.iter_mut() {
        match node {
            RichNode::Link { text, .. } => *node = RichNode::text(std::mem::take(text)),
            RichNode::Element { children, .. } => unwrap_links(children),
            RichNode::Text { .. } => {}
        }
    }
}

/// Joins neighbouring text nodes and drops empty ones, at any depth.
pub fn merge_text(nodes: &mut Vec<RichNode>) {
    let mut merged: Vec<RichNode> = Vec::with_capacity(nodes.len());
    for mut node in nodes.drain(..) {
        if let RichNode::Element { children, .. } = &mut node {
            merge_text(children);
        }
        if let RichNode::Text { text } = &node {
            if text.is_empty() {
                continue;
            }
            if let Some(RichNode::Text { text: previous }) = merged.last_mut() {
                previous.push_str(text);
                continue;
            }
        }
        merged.push(node);
    }
    *nodes = merged;
}

/// Re-derives every link in `nodes` from `records`: existing links are
/// unwrapped first, then each keyword occurrence in a text node becomes a
/// link to its record. Returns the number of links produced.
pub fn apply_smart_links(nodes: &mut Vec<RichNode>, records: &IndexMap<String, LinkRecord>) -> usize {
    unwrap_links(nodes);
    merge_text(nodes);

    let mut ids_by_keyword: HashMap<&str, &str> = HashMap::new();
    for (id, record) in records {
        if !record.keyword.trim().is_empty() {
            ids_by_keyword.entry(record.keyword.as_str()).or_insert(id.as_str());
        }
    }
    let matcher = Matcher::new(ids_by_keyword.keys());
    if matcher.is_empty() {
        return 0;
    }
    wrap_keywords(nodes, &matcher, &ids_by_keyword)
}

fn wrap_keywords(
    nodes: &mut Vec<RichNode>,
    matcher: &Matcher,
    ids_by_keyword: &HashMap<&str, &str>,
) -> usize {
    let mut count = 0;
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match node {
            RichNode::Text { text } if !text.trim().is_empty() => {
                let mut cursor = 0;
                for found in matcher.find(&text) {
                    let Some(id) = ids_by_keyword.get(found.key.as_str()) else {
                        continue;
                    };
                    if found.start > cursor {
                        out.push(RichNode::text(&text[cursor..found.start]));
                    }
                    out.push(RichNode::link(*id, &text[found.range()]));
                    cursor = found.end;
                    count += 1;
                }
                if cursor < text.len() {
                    out.push(RichNode::text(&text[cursor..]));
                }
            }
            RichNode::Element {
                tag,
                attrs,
                mut children,
            } => {
                count += wrap_keywords(&mut children, matcher, ids_by_keyword);
                out.push(RichNode::Element {
                    tag,
                    attrs,
                    children,
                });
            }
            other => out.push(other),
        }
    }
    *nodes = out;
    count
}

/// Link ids referenced anywhere in `nodes`, in document order.
pub fn link_ids(nodes: &[RichNode]) -> Vec<&str> {
    let mut ids = Vec::new();
    collect_link_ids(nodes, &mut ids);
    ids
}

fn collect_link_ids<'n>(nodes: &'n [RichNode], ids: &mut Vec<&'n str>) {
    for node in nodes {
        match node {
            RichNode::Link { link_id, .. } => ids.push(link_id),
            RichNode::Element { children, .. } => collect_link_ids(children, ids),
            RichNode::Text { .. } => {}
        }
    }
}

pub fn to_html(nodes: &[RichNode]) -> String {
    let mut html = String::new();
    write_html(nodes, &mut html);
    html
}

fn write_html(nodes: &[RichNode], html: &mut String) {
    for node in nodes {
        match node {
            RichNode::Text { text } => html.push_str(&escape_html(text)),
            RichNode::Link { link_id, text } => {
                html.push_str("<a class=\"smart-link\" data-link-id=\"");
                html.push_str(&escape_attr(link_id));
                html.push_str("\">");
                html.push_str(&escape_html(text));
                html.push_str("</a>");
            }
            RichNode::Element {
                tag,
                attrs,
                children,
            } => {
                html.push('<');
                html.push_str(tag);
                for (name, value) in attrs {
                    html.push(' ');
                    html.push_str(name);
                    html.push_str("=\"");
                    html.push_str(&escape_attr(value));
                    html.push('"');
                }
                html.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                write_html(children, html);
                html.push_str("</");
                html.push_str(tag);
                html.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(entries: &[(&str, &str)]) -> IndexMap<String, LinkRecord> {
        entries
            .iter()
            .map(|(id, keyword)| {
                (
                    id.to_string(),
                    LinkRecord {
                        keyword: keyword.to_string(),
                        ..LinkRecord::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn wraps_longest_keyword_and_respects_boundaries() {
        let records = records(&[("link_a", "عمر"), ("link_b", "عمر بن الخطاب")]);
        let mut nodes = vec![RichNode::text("قال عمر بن الخطاب ثم عمرو ثم عمر.")];
        assert_eq!(apply_smart_links(&mut nodes, &records), 2);
        assert_eq!(
            nodes,
            vec![
                RichNode::text("قال "),
                RichNode::link("link_b", "عمر بن الخطاب"),
                RichNode::text(" ثم عمرو ثم "),
                RichNode::link("link_a", "عمر"),
                RichNode::text("."),
            ]
        );
    }

    #[test]
    fn rewrapping_is_stable_and_follows_record_changes() {
        let mut records = records(&[("link_a", "بدر")]);
        let mut nodes = vec![RichNode::element(
            "p",
            vec![RichNode::text("ماء "), RichNode::text("بدر")],
        )];
        apply_smart_links(&mut nodes, &records);
        let first = nodes.clone();
        apply_smart_links(&mut nodes, &records);
        assert_eq!(nodes, first);
        assert_eq!(link_ids(&nodes), vec!["link_a"]);

        records.clear();
        assert_eq!(apply_smart_links(&mut nodes, &records), 0);
        assert_eq!(nodes, vec![RichNode::element("p", vec![RichNode::text("ماء بدر")])]);
    }

    #[test]
    fn html_output() {
        let mut nodes = vec![
            RichNode::element(
                "p",
                vec![RichNode::text("أحد <جبل>"), RichNode::element("br", vec![])],
            ),
            RichNode::text("x"),
        ];
        apply_smart_links(&mut nodes, &records(&[("link_1", "أحد")]));
        insta::assert_snapshot!(
            to_html(&nodes),
            @r#"<p><a class="smart-link" data-link-id="link_1">أحد</a> &lt;جبل&gt;<br></p>x"#
        );
        assert_eq!(plain_text(&nodes), "أحد <جبل>x");
    }

    #[test]
    fn node_tree_round_trips_through_json() -> anyhow::Result<()> {
        let raw = r#"[{"type":"element","tag":"b","children":[{"type":"link","link_id":"l","text":"t"}]}]"#;
        let nodes: Vec<RichNode> = serde_json::from_str(raw)?;
        assert_eq!(serde_json::to_string(&nodes)?, raw);
        Ok(())
    }
}

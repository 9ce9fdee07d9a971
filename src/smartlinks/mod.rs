//! Smart links: recognising glossary names inside event text.
//!
//! [`matcher`] is the shared primitive (spans only, no markup). [`annotate`]
//! turns spans into escaped HTML or styled segments, and [`dispatch`] maps
//! pointer activity on a link back to the glossaries.

pub mod annotate;
pub mod dispatch;
pub mod matcher;

pub use annotate::{annotate, escape_attr, escape_html, Annotator, Link, LinkKind, Segment};
pub use dispatch::{dispatch, LinkRequest, Pointer};
pub use matcher::{find_matches, Match, Matcher};

//! Per-year ordering of timeline events.
//!
//! # Invariants
//! - Events are partitioned by [`GroupKey`]: the numeric year, or the undated
//!   bucket which always sorts last.
//! - After [`normalize`], every group carries orders `1..=n` with no gaps or
//!   duplicates, and the slice itself is in display order.
//! - Unknown ids are no-ops that return `false`; they never error.

use std::cmp::Ordering;
use std::fmt;

use strum::{Display, EnumString};
use thiserror::Error;

use crate::model::Event;
use crate::text::collation_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Year(i64),
    Undated,
}

impl GroupKey {
    pub fn of(event: &Event) -> Self {
        Self::from(event.year)
    }

    pub fn year(self) -> Option<i64> {
        match self {
            Self::Year(year) => Some(year),
            Self::Undated => None,
        }
    }
}

impl From<Option<i64>> for GroupKey {
    fn from(year: Option<i64>) -> Self {
        year.map(Self::Year).unwrap_or(Self::Undated)
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Year(a), Self::Year(b)) => a.cmp(b),
            (Self::Year(_), Self::Undated) => Ordering::Less,
            (Self::Undated, Self::Year(_)) => Ordering::Greater,
            (Self::Undated, Self::Undated) => Ordering::Equal,
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Undated => f.write_str("undated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn offset(self) -> isize {
        match self {
            Self::Up => -1,
            Self::Down => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertError {
    #[error("event id cannot be empty")]
    EmptyId,
    #[error("an event with id '{0}' already exists")]
    DuplicateId(String),
}

/// Missing orders sort after every numbered peer.
fn order_rank(event: &Event) -> u64 {
    event.order.map(u64::from).unwrap_or(u64::MAX)
}

pub fn compare_within_group(a: &Event, b: &Event) -> Ordering {
    order_rank(a)
        .cmp(&order_rank(b))
        .then_with(|| collation_key(&a.title).cmp(&collation_key(&b.title)))
        .then_with(|| a.title.cmp(&b.title))
}

/// Year ascending with undated last, then per-group order, then title.
pub fn compare_display(a: &Event, b: &Event) -> Ordering {
    GroupKey::of(a)
        .cmp(&GroupKey::of(b))
        .then_with(|| compare_within_group(a, b))
}

/// Restores dense `1..=n` orders inside every group and sorts the slice into
/// display order. Every entry is renumbered to its sorted rank.
pub fn normalize(events: &mut [Event]) {
    events.sort_by(compare_display);
    let mut current: Option<GroupKey> = None;
    let mut rank = 0u32;
    for event in events.iter_mut() {
        let key = GroupKey::of(event);
        if current != Some(key) {
            current = Some(key);
            rank = 0;
        }
        rank += 1;
        event.order = Some(rank);
    }
}

/// Peers of `key` in display order.
pub fn peers<'a>(events: &'a [Event], key: GroupKey) -> Vec<&'a Event> {
    let mut peers: Vec<&Event> = events
        .iter()
        .filter(|event| GroupKey::of(event) == key)
        .collect();
    peers.sort_by(|a, b| compare_within_group(a, b));
    peers
}

/// Order an appended event would receive in `key`'s group.
pub fn next_order(events: &[Event], key: GroupKey) -> u32 {
    next_order_excluding(events, key, None)
}

fn next_order_excluding(events: &[Event], key: GroupKey, exclude: Option<&str>) -> u32 {
    events
        .iter()
        .filter(|event| GroupKey::of(event) == key)
        .filter(|event| Some(event.id.as_str()) != exclude)
        .filter_map(|event| event.order)
        .max()
        .map(|max| max.saturating_add(1))
        .unwrap_or(1)
}

/// Places `event` at `order` inside its own year group: every peer at or
/// beyond that order moves down by one before the event is added.
pub fn insert_at(events: &mut Vec<Event>, mut event: Event, order: u32) -> Result<(), InsertError> {
    validate_new_id(events, &event.id)?;
    let key = GroupKey::of(&event);
    for peer in events.iter_mut().filter(|peer| GroupKey::of(peer) == key) {
        if let Some(current) = peer.order {
            if current >= order {
                peer.order = Some(current.saturating_add(1));
            }
        }
    }
    event.order = Some(order.max(1));
    tracing::debug!(id = %event.id, %key, order, "inserting event");
    events.push(event);
    normalize(events);
    Ok(())
}

/// Inserts `event` into the anchor's year immediately before it. Returns
/// `Ok(false)` when the anchor does not exist.
pub fn insert_before(
    events: &mut Vec<Event>,
    anchor_id: &str,
    event: Event,
) -> Result<bool, InsertError> {
    insert_relative(events, anchor_id, event, 0)
}

/// Inserts `event` into the anchor's year immediately after it.
pub fn insert_after(
    events: &mut Vec<Event>,
    anchor_id: &str,
    event: Event,
) -> Result<bool, InsertError> {
    insert_relative(events, anchor_id, event, 1)
}

fn insert_relative(
    events: &mut Vec<Event>,
    anchor_id: &str,
    mut event: Event,
    offset: u32,
) -> Result<bool, InsertError> {
    validate_new_id(events, &event.id)?;
    let Some(anchor) = events.iter().find(|candidate| candidate.id == anchor_id) else {
        return Ok(false);
    };
    let key = GroupKey::of(anchor);
    let base = anchor
        .order
        .unwrap_or_else(|| next_order(events, key).saturating_sub(1).max(1));
    event.year = key.year();
    insert_at(events, event, base.saturating_add(offset))?;
    Ok(true)
}

/// Adds `event` at the end of its year group.
pub fn append(events: &mut Vec<Event>, event: Event) -> Result<(), InsertError> {
    let order = next_order(events, GroupKey::of(&event));
    insert_at(events, event, order)
}

/// Swaps the event with its neighbour in display order. Returns `false` at
/// either end of the group or for an unknown id.
pub fn move_event(events: &mut [Event], id: &str, direction: Direction) -> bool {
    normalize(events);
    let Some(event) = events.iter().find(|event| event.id == id) else {
        return false;
    };
    let group = peers(events, GroupKey::of(event));
    let Some(index) = group.iter().position(|peer| peer.id == id) else {
        return false;
    };
    let Some(target_index) = index.checked_add_signed(direction.offset()) else {
        return false;
    };
    let Some(target) = group.get(target_index) else {
        return false;
    };
    let (own_order, target_order, target_id) = (event.order, target.order, target.id.clone());

    for candidate in events.iter_mut() {
        if candidate.id == id {
            candidate.order = target_order;
        } else if candidate.id == target_id {
            candidate.order = own_order;
        }
    }
    normalize(events);
    true
}

/// Moves the event into `year`'s group at the end. The old group keeps a gap
/// until the normalization that closes this call.
pub fn change_year(events: &mut [Event], id: &str, year: Option<i64>) -> bool {
    let new_key = GroupKey::from(year);
    let Some(event) = events.iter().find(|event| event.id == id) else {
        return false;
    };
    if GroupKey::of(event) == new_key {
        return true;
    }
    let order = next_order_excluding(events, new_key, Some(id));
    if let Some(event) = events.iter_mut().find(|event| event.id == id) {
        event.year = year;
        event.order = Some(order);
    }
    normalize(events);
    true
}

/// Removes the event and closes the gap it leaves.
pub fn remove_event(events: &mut Vec<Event>, id: &str) -> Option<Event> {
    let index = events.iter().position(|event| event.id == id)?;
    let removed = events.remove(index);
    normalize(events);
    Some(removed)
}

fn validate_new_id(events: &[Event], id: &str) -> Result<(), InsertError> {
    if id.trim().is_empty() {
        return Err(InsertError::EmptyId);
    }
    if events.iter().any(|event| event.id == id) {
        return Err(InsertError::DuplicateId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn event(id: &str, year: Option<i64>, order: Option<u32>) -> Event {
        let mut event = Event::new(id, id.to_uppercase(), year);
        event.order = order;
        event
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|event| event.id.as_str()).collect()
    }

    fn orders_for(events: &[Event], key: GroupKey) -> Vec<u32> {
        let mut orders: Vec<u32> = events
            .iter()
            .filter(|event| GroupKey::of(event) == key)
            .filter_map(|event| event.order)
            .collect();
        orders.sort_unstable();
        orders
    }

    #[test]
    fn normalize_produces_dense_orders_per_group() {
        let mut events = vec![
            event("c", Some(2), Some(7)),
            event("a", Some(2), None),
            event("b", Some(2), Some(7)),
            event("x", None, Some(40)),
            event("y", None, None),
            event("z", Some(1), Some(3)),
        ];
        normalize(&mut events);

        assert_eq!(orders_for(&events, GroupKey::Year(2)), vec![1, 2, 3]);
        assert_eq!(orders_for(&events, GroupKey::Undated), vec![1, 2]);
        assert_eq!(orders_for(&events, GroupKey::Year(1)), vec![1]);
        // ties on order fall back to title; missing orders go last
        assert_eq!(ids(&events), vec!["z", "b", "c", "a", "x", "y"]);
    }

    #[test]
    fn undated_sorts_after_every_year() {
        let mut events = vec![
            event("undated", None, Some(1)),
            event("late", Some(12), Some(1)),
            event("early", Some(-53), Some(1)),
        ];
        normalize(&mut events);
        assert_eq!(ids(&events), vec!["early", "late", "undated"]);
    }

    #[test]
    fn insert_after_single_event_takes_next_order() -> anyhow::Result<()> {
        let mut events = vec![event("badr", Some(2), Some(1))];
        let inserted = insert_after(&mut events, "badr", Event::new("captives", "Captives", None))?;
        assert!(inserted);
        let badr = events.iter().find(|e| e.id == "badr").expect("badr");
        let new = events.iter().find(|e| e.id == "captives").expect("new event");
        assert_eq!(badr.order, Some(1));
        assert_eq!(new.order, Some(2));
        assert_eq!(new.year, Some(2));
        Ok(())
    }

    #[test]
    fn insert_before_places_event_immediately_ahead() -> anyhow::Result<()> {
        let mut events = vec![
            event("a", Some(3), Some(1)),
            event("b", Some(3), Some(2)),
            event("c", Some(3), Some(3)),
        ];
        insert_before(&mut events, "b", Event::new("n", "N", None))?;
        assert_eq!(ids(&events), vec!["a", "n", "b", "c"]);
        assert_eq!(orders_for(&events, GroupKey::Year(3)), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn insert_after_places_event_immediately_behind() -> anyhow::Result<()> {
        let mut events = vec![
            event("a", Some(3), Some(1)),
            event("b", Some(3), Some(2)),
            event("c", Some(3), Some(3)),
            event("other", Some(4), Some(1)),
        ];
        insert_after(&mut events, "b", Event::new("n", "N", None))?;
        assert_eq!(ids(&events), vec!["a", "b", "n", "c", "other"]);
        assert_eq!(events[4].order, Some(1));
        Ok(())
    }

    #[test]
    fn insert_relative_to_missing_anchor_is_noop() -> anyhow::Result<()> {
        let mut events = vec![event("a", Some(1), Some(1))];
        assert!(!insert_before(&mut events, "ghost", Event::new("n", "N", None))?);
        assert_eq!(ids(&events), vec!["a"]);
        Ok(())
    }

    #[test]
    fn insert_rejects_empty_and_duplicate_ids() {
        let mut events = vec![event("a", Some(1), Some(1))];
        assert_matches!(
            append(&mut events, Event::new(" ", "blank", Some(1))),
            Err(InsertError::EmptyId)
        );
        assert_matches!(
            insert_after(&mut events, "a", Event::new("a", "again", Some(1))),
            Err(InsertError::DuplicateId(id)) if id == "a"
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn append_uses_max_plus_one_or_one() -> anyhow::Result<()> {
        let mut events = vec![event("a", Some(5), Some(1)), event("b", Some(5), Some(2))];
        append(&mut events, Event::new("c", "C", Some(5)))?;
        append(&mut events, Event::new("d", "D", Some(9)))?;
        assert_eq!(events.iter().find(|e| e.id == "c").and_then(|e| e.order), Some(3));
        assert_eq!(events.iter().find(|e| e.id == "d").and_then(|e| e.order), Some(1));
        Ok(())
    }

    #[test]
    fn move_up_and_down_are_inverses() {
        let mut events = vec![
            event("a", Some(1), Some(1)),
            event("b", Some(1), Some(2)),
            event("c", Some(1), Some(3)),
        ];
        let original = ids(&events).iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(move_event(&mut events, "b", Direction::Down));
        assert_eq!(ids(&events), vec!["a", "c", "b"]);
        assert!(move_event(&mut events, "b", Direction::Up));
        assert_eq!(ids(&events), original);
    }

    #[test]
    fn move_at_group_edges_is_noop() {
        let mut events = vec![
            event("a", Some(1), Some(1)),
            event("b", Some(1), Some(2)),
            event("next-year", Some(2), Some(1)),
        ];
        assert!(!move_event(&mut events, "a", Direction::Up));
        assert!(!move_event(&mut events, "b", Direction::Down));
        assert!(!move_event(&mut events, "ghost", Direction::Down));
        assert_eq!(ids(&events), vec!["a", "b", "next-year"]);
    }

    #[test]
    fn change_year_appends_to_new_group_and_closes_gap() {
        let mut events = vec![
            event("a", Some(1), Some(1)),
            event("b", Some(1), Some(2)),
            event("c", Some(1), Some(3)),
            event("d", Some(2), Some(1)),
        ];
        assert!(change_year(&mut events, "a", Some(2)));
        assert_eq!(ids(&events), vec!["b", "c", "d", "a"]);
        assert_eq!(orders_for(&events, GroupKey::Year(1)), vec![1, 2]);
        assert_eq!(events.iter().find(|e| e.id == "a").and_then(|e| e.order), Some(2));
        assert!(!change_year(&mut events, "ghost", None));
    }

    #[test]
    fn remove_closes_gap() {
        let mut events = vec![
            event("a", Some(1), Some(1)),
            event("b", Some(1), Some(2)),
            event("c", Some(1), Some(3)),
        ];
        assert!(remove_event(&mut events, "b").is_some());
        assert!(remove_event(&mut events, "b").is_none());
        assert_eq!(orders_for(&events, GroupKey::Year(1)), vec![1, 2]);
    }

    #[test]
    fn direction_parses_from_cli_words() -> anyhow::Result<()> {
        assert_eq!("up".parse::<Direction>()?, Direction::Up);
        assert_eq!("DOWN".parse::<Direction>()?, Direction::Down);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NEW_YEAR_TITLE: &str = "سنة/باب جديد";
pub const NEW_EVENT_TITLE: &str = "موضوع جديد";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEvent {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineYear {
    pub title: String,
    #[serde(default)]
    pub events: Vec<OutlineEvent>,
}

/// Sidebar structure: free-form year headings, each with its event entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub years: Vec<OutlineYear>,
}

pub fn new_event_id() -> String {
    format!("event_{}", Uuid::new_v4().simple())
}

impl Outline {
    pub fn is_empty(&self) -> bool {
        self.years.iter().all(|year| year.events.is_empty())
    }

    /// First event in sidebar order, the default when nothing is active.
    pub fn first_event(&self) -> Option<&OutlineEvent> {
        self.years.iter().flat_map(|year| year.events.iter()).next()
    }

    pub fn find_event(&self, id: &str) -> Option<(usize, usize)> {
        self.years.iter().enumerate().find_map(|(y, year)| {
            year.events
                .iter()
                .position(|event| event.id == id)
                .map(|e| (y, e))
        })
    }

    /// Adds a heading after `after`, or at the end. Returns its index.
    pub fn add_year(&mut self, title: Option<&str>, after: Option<usize>) -> usize {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(NEW_YEAR_TITLE);
        let index = match after {
            Some(after) if after < self.years.len() => after + 1,
            _ => self.years.len(),
        };
        self.years.insert(
            index,
            OutlineYear {
                title: title.to_string(),
                events: Vec::new(),
            },
        );
        index
    }

    /// Appends a new entry under the heading at `year`. Unknown heading is a miss.
    pub fn add_event_to_year(&mut self, year: usize) -> Option<String> {
        let year = self.years.get_mut(year)?;
        let id = new_event_id();
        year.events.push(OutlineEvent {
            id: id.clone(),
            title: NEW_EVENT_TITLE.to_string(),
        });
        Some(id)
    }

    /// Inserts a new entry right after `anchor` in the same heading.
    pub fn add_event_after(&mut self, anchor: &str) -> Option<String> {
        let (y, e) = self.find_event(anchor)?;
        let id = new_event_id();
        self.years[y].events.insert(
            e + 1,
            OutlineEvent {
                id: id.clone(),
                title: NEW_EVENT_TITLE.to_string(),
            },
        );
        Some(id)
    }

    pub fn rename_year(&mut self, index: usize, title: &str) -> bool {
        match self.years.get_mut(index) {
            Some(year) => {
                year.title = title.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn rename_event(&mut self, id: &str, title: &str) -> bool {
        match self.find_event(id) {
            Some((y, e)) => {
                self.years[y].events[e].title = title.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_event(&mut self, id: &str) -> Option<OutlineEvent> {
        let (y, e) = self.find_event(id)?;
        Some(self.years[y].events.remove(e))
    }

    /// Removes the heading and returns the ids of the entries it held.
    pub fn remove_year(&mut self, index: usize) -> Option<Vec<String>> {
        if index >= self.years.len() {
            return None;
        }
        let year = self.years.remove(index);
        Some(year.events.into_iter().map(|event| event.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_edits_sidebar() {
        let mut outline = Outline::default();
        assert!(outline.is_empty());
        let first = outline.add_year(Some("السنة الأولى"), None);
        let second = outline.add_year(None, None);
        assert_eq!((first, second), (0, 1));
        assert_eq!(outline.years[1].title, NEW_YEAR_TITLE);

        let a = outline.add_event_to_year(0).unwrap_or_default();
        let b = outline.add_event_after(&a).unwrap_or_default();
        let c = outline.add_event_to_year(0).unwrap_or_default();
        assert!(a.starts_with("event_"));
        let ids: Vec<_> = outline.years[0].events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(outline.first_event().map(|e| e.id.as_str()), Some(a.as_str()));

        assert!(outline.add_event_to_year(9).is_none());
        assert!(outline.rename_event(&b, " الهجرة "));
        assert_eq!(outline.years[0].events[1].title, "الهجرة");

        let inserted = outline.add_year(Some("بين"), Some(0));
        assert_eq!(inserted, 1);
        assert_eq!(outline.remove_year(0), Some(vec![a, b, c]));
        assert_eq!(outline.years[0].title, "بين");
        assert_eq!(outline.remove_year(5), None);
    }
}

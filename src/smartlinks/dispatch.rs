use crate::model::{Biographies, Biography, Place, Places};

use super::annotate::{Link, LinkKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Enter,
    Leave,
    Click,
}

/// What the presentation layer should do in response to pointer activity on
/// a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    ShowTooltip(String),
    HideTooltip,
    OpenPerson { name: String, biography: Biography },
    OpenPlace { name: String, place: Place },
}

/// Resolves the link's stored name against its dictionary. A name that has
/// since left the dictionary yields `None`.
pub fn dispatch(
    link: &Link,
    pointer: Pointer,
    people: &Biographies,
    places: &Places,
) -> Option<LinkRequest> {
    if pointer == Pointer::Leave {
        return Some(LinkRequest::HideTooltip);
    }
    match link.kind {
        LinkKind::Person => {
            let biography = people.get(&link.name)?;
            Some(match pointer {
                Pointer::Click => LinkRequest::OpenPerson {
                    name: link.name.clone(),
                    biography: biography.clone(),
                },
                _ => LinkRequest::ShowTooltip(tooltip_text(&link.name, &biography.short)),
            })
        }
        LinkKind::Place => {
            let place = places.get(&link.name)?;
            Some(match pointer {
                Pointer::Click => LinkRequest::OpenPlace {
                    name: link.name.clone(),
                    place: place.clone(),
                },
                _ => LinkRequest::ShowTooltip(tooltip_text(&link.name, &place.desc)),
            })
        }
    }
}

fn tooltip_text(name: &str, summary: &str) -> String {
    format!("{name} — {summary}")
}

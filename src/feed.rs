//! Feed selection
//!
//! Picks the collection for the active tab and describes how each item is
//! rendered. Pure: nothing here loads, merges identities across tabs, or
//! mutates a collection, so switching tabs back and forth always shows the
//! same contents until a loader commits new data.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::calllog::CallLogEntry;
use crate::contacts::ContactRecord;
use crate::leads::LeadRecord;
use crate::session::{CallSession, ContactType, DialTarget, PartyRef};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedTab {
    #[default]
    Contacts,
    Leads,
    Recent,
}

/// Borrowed view of every independently loaded collection
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedSources<'a> {
    pub contacts: &'a [ContactRecord],
    pub leads: &'a [LeadRecord],
    /// Newest first
    pub sessions: &'a [CallSession],
    pub call_log: &'a [CallLogEntry],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecentItem<'a> {
    Session(&'a CallSession),
    Logged(&'a CallLogEntry),
}

impl RecentItem<'_> {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RecentItem::Session(s) => s.started_at,
            RecentItem::Logged(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedItem<'a> {
    Contact(&'a ContactRecord),
    Lead(&'a LeadRecord),
    Recent(RecentItem<'a>),
}

/// What the list row shows and what tapping it dials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderContract {
    pub key: String,
    pub avatar_initial: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial: Option<DialTarget>,
}

#[derive(Debug, Clone)]
pub struct Feed<'a> {
    pub tab: FeedTab,
    pub items: Vec<FeedItem<'a>>,
}

impl Feed<'_> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self) -> Vec<RenderContract> {
        self.items.iter().enumerate().map(|(i, item)| item.render(i)).collect()
    }
}

/// Collection for `tab`
pub fn select_feed<'a>(tab: FeedTab, sources: &FeedSources<'a>) -> Feed<'a> {
    let items = match tab {
        FeedTab::Contacts => sources.contacts.iter().map(FeedItem::Contact).collect(),
        FeedTab::Leads => sources.leads.iter().map(FeedItem::Lead).collect(),
        FeedTab::Recent => recent_items(sources.sessions, sources.call_log)
            .into_iter()
            .map(FeedItem::Recent)
            .collect(),
    };
    Feed { tab, items }
}

/// Tracked sessions and device log rows, newest first. Ties keep sessions
/// ahead of log rows.
pub fn recent_items<'a>(sessions: &'a [CallSession], call_log: &'a [CallLogEntry]) -> Vec<RecentItem<'a>> {
    let mut items: Vec<RecentItem<'a>> = sessions
        .iter()
        .map(RecentItem::Session)
        .chain(call_log.iter().map(RecentItem::Logged))
        .collect();
    items.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    items
}

/// Row key: the record's own id, else its position.
pub fn item_key(item: &FeedItem<'_>, index: usize) -> String {
    let id = match item {
        FeedItem::Contact(c) => Some(c.id.as_str()).filter(|id| !id.is_empty()),
        FeedItem::Lead(l) => l.id.as_deref(),
        FeedItem::Recent(RecentItem::Session(s)) => Some(s.id.as_str()),
        FeedItem::Recent(RecentItem::Logged(_)) => None,
    };
    id.map(str::to_string).unwrap_or_else(|| index.to_string())
}

fn avatar_initial(name: Option<&str>) -> String {
    name.and_then(|n| n.trim().chars().next())
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn recent_details(ts: DateTime<Utc>, duration_secs: u64, direction: Option<&str>) -> String {
    let mut line = format_timestamp(ts);
    if duration_secs > 0 {
        line.push_str(&format!(" • {}s", duration_secs));
    }
    if let Some(direction) = direction {
        line.push_str(&format!(" • {}", direction));
    }
    line
}

impl FeedItem<'_> {
    pub fn render(&self, index: usize) -> RenderContract {
        let key = item_key(self, index);
        match self {
            FeedItem::Contact(c) => RenderContract {
                key,
                avatar_initial: avatar_initial(c.name.as_deref()),
                title: c.display_name().to_string(),
                subtitle: c.primary_number().map(str::to_string),
                details: Vec::new(),
                dial: c.primary_number().map(|n| DialTarget {
                    number: n.to_string(),
                    contact_type: ContactType::Contact,
                    party: Some(PartyRef {
                        id: Some(c.id.clone()),
                        name: c.name.clone(),
                    }),
                }),
            },
            FeedItem::Lead(l) => RenderContract {
                key,
                avatar_initial: avatar_initial(l.name.as_deref()),
                title: l.display_name().to_string(),
                subtitle: Some(l.phone_number.clone()),
                details: vec![
                    format!(
                        "Status: {} • Priority: {}",
                        l.status.as_str(),
                        l.priority.as_deref().unwrap_or("-")
                    ),
                    format!("Email: {}", l.email.as_deref().unwrap_or("")),
                ],
                dial: Some(DialTarget {
                    number: l.phone_number.clone(),
                    contact_type: ContactType::Lead,
                    party: Some(PartyRef {
                        id: l.id.clone(),
                        name: l.name.clone(),
                    }),
                }),
            },
            FeedItem::Recent(RecentItem::Session(s)) => {
                let name = s.party.as_ref().and_then(|p| p.name.as_deref());
                RenderContract {
                    key,
                    avatar_initial: avatar_initial(name),
                    title: name.unwrap_or(&s.dialed).to_string(),
                    subtitle: Some(s.dialed.clone()),
                    details: vec![recent_details(s.started_at, s.duration_secs, None)],
                    dial: Some(DialTarget {
                        number: s.dialed.clone(),
                        contact_type: s.contact_type,
                        party: s.party.clone(),
                    }),
                }
            }
            FeedItem::Recent(RecentItem::Logged(e)) => {
                let name = e.contact.as_ref().and_then(|p| p.name.as_deref());
                RenderContract {
                    key,
                    avatar_initial: avatar_initial(name),
                    title: name.unwrap_or(&e.number).to_string(),
                    subtitle: Some(e.number.clone()),
                    details: vec![recent_details(e.timestamp, e.duration_secs, Some(e.direction.label()))],
                    dial: Some(DialTarget {
                        number: e.number.clone(),
                        contact_type: if e.contact.is_some() {
                            ContactType::Contact
                        } else {
                            ContactType::AdHoc
                        },
                        party: e.contact.clone(),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calllog::CallDirection;
    use crate::contacts::tests::contact;
    use crate::leads::source::tests::lead;
    use crate::session::SessionStatus;
    use chrono::Duration;

    fn session(id: &str, number: &str, started_at: DateTime<Utc>, duration_secs: u64) -> CallSession {
        CallSession {
            id: id.to_string(),
            number: number.to_string(),
            dialed: number.to_string(),
            status: SessionStatus::Closed,
            started_at,
            ended_at: Some(started_at + Duration::seconds(duration_secs as i64)),
            duration_secs,
            contact_type: ContactType::AdHoc,
            party: None,
        }
    }

    #[test]
    fn test_leads_tab_ignores_empty_contacts() {
        let leads = vec![lead("1", "A", "1"), lead("2", "B", "2"), lead("3", "C", "3")];
        let sources = FeedSources { leads: &leads, ..Default::default() };
        let feed = select_feed(FeedTab::Leads, &sources);
        assert_eq!(feed.len(), 3);
        assert!(select_feed(FeedTab::Contacts, &sources).is_empty());
    }

    #[test]
    fn test_switching_tabs_is_stable() {
        let contacts = vec![contact("c1", Some("Ann"), &["555"])];
        let leads = vec![lead("1", "A", "1")];
        let sources = FeedSources { contacts: &contacts, leads: &leads, ..Default::default() };
        let first = select_feed(FeedTab::Contacts, &sources).render();
        let _ = select_feed(FeedTab::Leads, &sources);
        let again = select_feed(FeedTab::Contacts, &sources).render();
        assert_eq!(first, again);
    }

    #[test]
    fn test_recent_interleaves_newest_first() {
        let now = Utc::now();
        let sessions = vec![session("s1", "5551234", now - Duration::minutes(1), 42)];
        let log = vec![
            CallLogEntry {
                number: "5550000".into(),
                timestamp: now,
                duration_secs: 0,
                direction: CallDirection::Missed,
                contact: None,
            },
            CallLogEntry {
                number: "5559999".into(),
                timestamp: now - Duration::hours(1),
                duration_secs: 10,
                direction: CallDirection::Incoming,
                contact: Some(PartyRef { id: Some("c9".into()), name: Some("zed".into()) }),
            },
        ];
        let sources = FeedSources { sessions: &sessions, call_log: &log, ..Default::default() };
        let rows = select_feed(FeedTab::Recent, &sources).render();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "5550000");
        assert!(rows[0].details[0].ends_with(" • Missed"));
        assert_eq!(rows[0].key, "0");
        assert_eq!(rows[1].key, "s1");
        assert!(rows[1].details[0].ends_with(" • 42s"));
        assert_eq!(rows[2].title, "zed");
        assert_eq!(rows[2].avatar_initial, "Z");
        assert_eq!(rows[2].dial.as_ref().unwrap().contact_type, ContactType::Contact);
    }

    #[test]
    fn test_contact_and_lead_contracts() {
        let contacts = vec![contact("c1", None, &[])];
        let rows = select_feed(FeedTab::Contacts, &FeedSources { contacts: &contacts, ..Default::default() }).render();
        assert_eq!(rows[0].avatar_initial, "?");
        assert!(rows[0].dial.is_none());

        let mut unnamed = lead("x", "ravi", "+91 98765 43210");
        unnamed.id = None;
        let leads = vec![unnamed];
        let rows = select_feed(FeedTab::Leads, &FeedSources { leads: &leads, ..Default::default() }).render();
        assert_eq!(rows[0].key, "0");
        assert_eq!(rows[0].avatar_initial, "R");
        assert_eq!(rows[0].details[0], "Status: pending • Priority: high");
        assert_eq!(rows[0].details[1], "Email: x@example.com");
        let dial = rows[0].dial.as_ref().unwrap();
        assert_eq!(dial.contact_type, ContactType::Lead);
        assert_eq!(dial.number, "+91 98765 43210");
    }
}

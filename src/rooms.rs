//! Per-tab room list cache with paging and a single-flight fetch guard.
//!
//! The cache never talks to the network itself. Operations that need a page
//! return a [`FetchTicket`]; the caller performs the request and hands the
//! result back through [`RoomCache::apply_page`] or
//! [`RoomCache::fetch_failed`]. Only the outstanding ticket is accepted, so a
//! response that lands after a tab switch or an invalidation is dropped.

use tracing::debug;

use crate::api::RoomPage;
use crate::model::{RoomPatch, RoomSummary};

/// Rows from the bottom of the list at which the next page is requested
pub const SCROLL_THRESHOLD_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    All,
    Direct,
    Group,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::All, Tab::Direct, Tab::Group];

    pub fn key(self) -> &'static str {
        match self {
            Tab::All => "all",
            Tab::Direct => "direct",
            Tab::Group => "group",
        }
    }

    /// Value of the `type` query parameter; the unfiltered tab sends none
    pub fn query_type(self) -> Option<&'static str> {
        match self {
            Tab::All => None,
            Tab::Direct => Some("direct"),
            Tab::Group => Some("group"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::All => "All",
            Tab::Direct => "Individual",
            Tab::Group => "Group",
        }
    }

    pub fn next(self) -> Tab {
        match self {
            Tab::All => Tab::Direct,
            Tab::Direct => Tab::Group,
            Tab::Group => Tab::All,
        }
    }

    pub fn prev(self) -> Tab {
        match self {
            Tab::All => Tab::Group,
            Tab::Direct => Tab::All,
            Tab::Group => Tab::Direct,
        }
    }

    fn index(self) -> usize {
        match self {
            Tab::All => 0,
            Tab::Direct => 1,
            Tab::Group => 2,
        }
    }
}

/// Identifies one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub tab: Tab,
    pub page: u32,
    pub reset: bool,
}

#[derive(Debug, Clone)]
struct TabCache {
    rooms: Vec<RoomSummary>,
    page: u32,
    has_more: bool,
}

impl Default for TabCache {
    fn default() -> Self {
        Self {
            rooms: Vec::new(),
            page: 1,
            has_more: true,
        }
    }
}

/// Whether a scrollable list is within `threshold` of its end.
/// Same shape as `scrollHeight - scrollTop <= clientHeight + threshold`.
pub fn near_end(content_len: usize, offset: usize, viewport: usize, threshold: usize) -> bool {
    content_len.saturating_sub(offset) <= viewport + threshold
}

fn append_unique(target: &mut Vec<RoomSummary>, rooms: &[RoomSummary]) {
    for room in rooms {
        if !target.iter().any(|r| r.id == room.id) {
            target.push(room.clone());
        }
    }
}

#[derive(Debug)]
pub struct RoomCache {
    tabs: [TabCache; 3],
    active: Tab,
    /// What the room list shows
    visible: Vec<RoomSummary>,
    in_flight: Option<FetchTicket>,
    next_seq: u64,
}

impl Default for RoomCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCache {
    pub fn new() -> Self {
        Self {
            tabs: Default::default(),
            active: Tab::All,
            visible: Vec::new(),
            in_flight: None,
            next_seq: 0,
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.active
    }

    pub fn visible(&self) -> &[RoomSummary] {
        &self.visible
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, tab: Tab) -> &[RoomSummary] {
        &self.tabs[tab.index()].rooms
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.tabs[self.active.index()].has_more
    }

    pub fn page(&self) -> u32 {
        self.tabs[self.active.index()].page
    }

    /// Every room the client currently holds, visible list first
    pub fn known_rooms(&self) -> impl Iterator<Item = &RoomSummary> {
        self.visible
            .iter()
            .chain(self.tabs.iter().flat_map(|t| t.rooms.iter()))
    }

    /// Switch tabs. Cached rooms are shown at once; an empty tab asks for
    /// its first page.
    pub fn select_tab(&mut self, tab: Tab) -> Option<FetchTicket> {
        self.active = tab;
        self.in_flight = None;
        let cache = &mut self.tabs[tab.index()];
        cache.page = 1;
        cache.has_more = true;

        if cache.rooms.is_empty() {
            self.visible.clear();
            self.fetch_page(tab, 1, true)
        } else {
            self.visible = cache.rooms.clone();
            None
        }
    }

    /// Issue a ticket unless a fetch is already outstanding
    pub fn fetch_page(&mut self, tab: Tab, page: u32, reset: bool) -> Option<FetchTicket> {
        if self.in_flight.is_some() {
            debug!("Suppressed fetch of {} page {}", tab.key(), page);
            return None;
        }
        self.next_seq += 1;
        let ticket = FetchTicket {
            seq: self.next_seq,
            tab,
            page,
            reset,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    pub fn on_scroll_near_end(&mut self) -> Option<FetchTicket> {
        if !self.has_more() || self.in_flight.is_some() {
            return None;
        }
        let next = self.page() + 1;
        self.fetch_page(self.active, next, false)
    }

    /// Accept a page for the outstanding ticket. Returns false when the
    /// ticket is stale and the page was dropped.
    pub fn apply_page(&mut self, ticket: FetchTicket, page: RoomPage) -> bool {
        if self.in_flight != Some(ticket) {
            debug!("Dropped stale page {} of {}", ticket.page, ticket.tab.key());
            return false;
        }
        self.in_flight = None;

        let cache = &mut self.tabs[ticket.tab.index()];
        if ticket.reset {
            cache.rooms = page.rooms.clone();
        } else {
            append_unique(&mut cache.rooms, &page.rooms);
        }
        cache.page = ticket.page;
        cache.has_more = ticket.page < page.total_pages;

        if ticket.tab == self.active {
            if ticket.reset {
                self.visible = page.rooms;
            } else {
                append_unique(&mut self.visible, &page.rooms);
            }
        }
        true
    }

    /// Release the guard after a failed request. Returns false for stale
    /// tickets.
    pub fn fetch_failed(&mut self, ticket: FetchTicket) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// A room was created: drop every tab cache, show the room on top and
    /// resynchronise the active tab.
    pub fn on_room_created(&mut self, room: RoomSummary) -> Option<FetchTicket> {
        for cache in &mut self.tabs {
            *cache = TabCache::default();
        }
        self.visible.retain(|r| r.id != room.id);
        self.visible.insert(0, room);
        self.in_flight = None;
        self.fetch_page(self.active, 1, true)
    }

    /// Merge a message summary into every copy of the room
    pub fn on_message_sent(&mut self, patch: &RoomPatch) {
        let lists = std::iter::once(&mut self.visible).chain(self.tabs.iter_mut().map(|t| &mut t.rooms));
        for list in lists {
            if let Some(room) = list.iter_mut().find(|r| r.id == patch.room_id) {
                room.apply(patch);
            }
        }
    }

    /// Forget everything on logout. The ticket counter survives so replies
    /// to the old session cannot match a new fetch.
    pub fn clear(&mut self) {
        self.tabs = Default::default();
        self.active = Tab::All;
        self.visible.clear();
        self.in_flight = None;
    }

    /// Hard refresh of the active tab, used after the send debounce fires
    pub fn invalidate_active(&mut self) -> Option<FetchTicket> {
        self.tabs[self.active.index()] = TabCache::default();
        self.in_flight = None;
        self.fetch_page(self.active, 1, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn room(id: &str, is_group: bool) -> RoomSummary {
        RoomSummary {
            id: id.to_string(),
            name: format!("room {}", id),
            is_group,
            members: Vec::new(),
            last_message: None,
            last_message_at: None,
            last_message_sender_id: None,
            delivered_to: Vec::new(),
            seen_by: Vec::new(),
        }
    }

    fn page(ids: &[&str], total_pages: u32) -> RoomPage {
        RoomPage {
            rooms: ids.iter().map(|id| room(id, false)).collect(),
            total_pages,
        }
    }

    fn ids(rooms: &[RoomSummary]) -> Vec<&str> {
        rooms.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn first_tab_selection_fetches_page_one() {
        let mut cache = RoomCache::new();
        let ticket = cache.select_tab(Tab::All).unwrap();
        assert_eq!((ticket.tab, ticket.page, ticket.reset), (Tab::All, 1, true));
        assert!(cache.is_fetching());
    }

    #[test]
    fn cached_tab_is_shown_without_a_fetch() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::Direct).unwrap();
        assert!(cache.apply_page(t, page(&["d1", "d2"], 1)));

        let t = cache.select_tab(Tab::All).unwrap();
        assert!(cache.apply_page(t, page(&["a1"], 1)));

        assert!(cache.select_tab(Tab::Direct).is_none());
        assert!(!cache.is_fetching());
        assert_eq!(cache.visible(), cache.cached(Tab::Direct));
        assert_eq!(ids(cache.visible()), vec!["d1", "d2"]);
    }

    #[test]
    fn reset_page_replaces_previous_entries() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::All).unwrap();
        cache.apply_page(t, page(&["a", "b"], 3));
        let t = cache.on_scroll_near_end().unwrap();
        cache.apply_page(t, page(&["c"], 3));
        assert_eq!(ids(cache.visible()), vec!["a", "b", "c"]);

        let t = cache.invalidate_active().unwrap();
        assert!(cache.apply_page(t, page(&["z"], 1)));
        assert_eq!(ids(cache.cached(Tab::All)), vec!["z"]);
        assert_eq!(ids(cache.visible()), vec!["z"]);
        assert!(!cache.has_more());
    }

    #[test]
    fn rapid_scroll_issues_a_single_fetch() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::All).unwrap();
        cache.apply_page(t, page(&["a"], 5));

        let first = cache.on_scroll_near_end();
        assert_eq!(first.map(|t| t.page), Some(2));
        for _ in 0..10 {
            assert!(cache.on_scroll_near_end().is_none());
            assert!(cache.fetch_page(Tab::All, 2, false).is_none());
        }
    }

    #[test]
    fn scroll_stops_when_last_page_reached() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::All).unwrap();
        cache.apply_page(t, page(&["a"], 2));
        let t = cache.on_scroll_near_end().unwrap();
        cache.apply_page(t, page(&["b"], 2));
        assert_eq!(cache.page(), 2);
        assert!(!cache.has_more());
        assert!(cache.on_scroll_near_end().is_none());
    }

    #[test]
    fn appended_pages_skip_known_ids() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::All).unwrap();
        cache.apply_page(t, page(&["a", "b"], 2));
        let t = cache.on_scroll_near_end().unwrap();
        cache.apply_page(t, page(&["b", "c"], 2));
        assert_eq!(ids(cache.cached(Tab::All)), vec!["a", "b", "c"]);
    }

    #[test]
    fn stale_response_after_tab_switch_is_dropped() {
        let mut cache = RoomCache::new();
        let all = cache.select_tab(Tab::All).unwrap();
        let group = cache.select_tab(Tab::Group).unwrap();

        assert!(!cache.apply_page(all, page(&["a1"], 1)));
        assert!(cache.cached(Tab::All).is_empty());
        assert!(cache.is_fetching());

        assert!(cache.apply_page(group, page(&["g1"], 1)));
        assert_eq!(ids(cache.visible()), vec!["g1"]);
    }

    #[test]
    fn failed_fetch_releases_guard() {
        let mut cache = RoomCache::new();
        let t = cache.select_tab(Tab::All).unwrap();
        assert!(cache.fetch_failed(t));
        assert!(!cache.is_fetching());
        assert!(!cache.fetch_failed(t));
    }

    #[test]
    fn room_creation_clears_every_tab_and_prepends() {
        let mut cache = RoomCache::new();
        for tab in [Tab::Direct, Tab::Group, Tab::All] {
            let t = cache.select_tab(tab).unwrap();
            cache.apply_page(t, page(&["x", "y"], 1));
        }

        let ticket = cache.on_room_created(room("new", true)).unwrap();
        assert_eq!((ticket.tab, ticket.page, ticket.reset), (Tab::All, 1, true));
        for tab in Tab::ALL {
            assert!(cache.cached(tab).is_empty());
        }
        assert_eq!(ids(cache.visible()), vec!["new", "x", "y"]);
    }

    #[test]
    fn message_patch_reaches_every_copy() {
        let mut cache = RoomCache::new();
        for tab in [Tab::Direct, Tab::All] {
            let t = cache.select_tab(tab).unwrap();
            cache.apply_page(t, page(&["r1", "r2"], 1));
        }
        let patch = RoomPatch {
            room_id: "r1".into(),
            last_message: "hello".into(),
            last_message_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            last_message_sender_id: "u1".into(),
            delivered_to: vec!["u2".into()],
            seen_by: Vec::new(),
        };
        cache.on_message_sent(&patch);

        for rooms in [cache.visible(), cache.cached(Tab::All), cache.cached(Tab::Direct)] {
            let r1 = rooms.iter().find(|r| r.id == "r1").unwrap();
            assert_eq!(r1.last_message.as_deref(), Some("hello"));
            let r2 = rooms.iter().find(|r| r.id == "r2").unwrap();
            assert!(r2.last_message.is_none());
        }
    }

    #[test]
    fn near_end_matches_scroll_geometry() {
        assert!(near_end(20, 10, 8, SCROLL_THRESHOLD_ROWS));
        assert!(!near_end(40, 0, 8, SCROLL_THRESHOLD_ROWS));
        assert!(near_end(5, 0, 8, SCROLL_THRESHOLD_ROWS));
    }

    #[test]
    fn clear_keeps_old_tickets_stale() {
        let mut cache = RoomCache::new();
        let old = cache.select_tab(Tab::All).unwrap();
        cache.clear();
        let fresh = cache.select_tab(Tab::All).unwrap();
        assert_ne!(old, fresh);
        assert!(!cache.apply_page(old, page(&["r1"], 1)));
        assert!(cache.apply_page(fresh, page(&["r2"], 1)));
        assert_eq!(cache.visible()[0].id, "r2");
    }
}

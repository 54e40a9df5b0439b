//! New chat drawer: user search, selection, and the create-or-reuse decision.

use crate::api::CreateRoomRequest;
use crate::format::full_name;
use crate::model::{RoomSummary, UserSummary};

/// Which drawer field receives typed characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorFocus {
    Search,
    Users,
    GroupName,
}

/// Identifies a user search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub seq: u64,
    pub query: String,
}

/// What pressing "create" should do
#[derive(Debug, Clone, PartialEq)]
pub enum CreatePlan {
    /// A direct room with the selected user already exists
    Reuse(RoomSummary),
    Create(CreateRoomRequest),
}

#[derive(Debug)]
pub struct RoomCreator {
    pub query: String,
    pub group_name: String,
    pub focus: CreatorFocus,
    pub cursor: usize,
    pub busy: bool,
    pub error: Option<String>,
    users: Vec<UserSummary>,
    selected: Vec<UserSummary>,
    search_seq: u64,
}

impl Default for RoomCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCreator {
    pub fn new() -> Self {
        Self {
            query: String::new(),
            group_name: String::new(),
            focus: CreatorFocus::Search,
            cursor: 0,
            busy: false,
            error: None,
            users: Vec::new(),
            selected: Vec::new(),
            search_seq: 0,
        }
    }

    pub fn users(&self) -> &[UserSummary] {
        &self.users
    }

    pub fn selected(&self) -> &[UserSummary] {
        &self.selected
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected.iter().any(|u| u.id == user_id)
    }

    pub fn is_group(&self) -> bool {
        self.selected.len() > 1
    }

    /// Ticket for a search with the current query
    pub fn search(&mut self) -> SearchTicket {
        self.search_seq += 1;
        SearchTicket {
            seq: self.search_seq,
            query: self.query.trim().to_string(),
        }
    }

    /// Returns false when a newer search has been issued since
    pub fn apply_search(&mut self, ticket: &SearchTicket, users: Vec<UserSummary>) -> bool {
        if ticket.seq != self.search_seq {
            return false;
        }
        self.users = users;
        self.cursor = self.cursor.min(self.users.len().saturating_sub(1));
        true
    }

    pub fn toggle(&mut self, user: &UserSummary) {
        if let Some(pos) = self.selected.iter().position(|u| u.id == user.id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(user.clone());
        }
    }

    pub fn toggle_at_cursor(&mut self) {
        if let Some(user) = self.users.get(self.cursor).cloned() {
            self.toggle(&user);
        }
    }

    pub fn cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_down(&mut self) {
        if self.cursor + 1 < self.users.len() {
            self.cursor += 1;
        }
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            CreatorFocus::Search => CreatorFocus::Users,
            CreatorFocus::Users if self.is_group() => CreatorFocus::GroupName,
            CreatorFocus::Users | CreatorFocus::GroupName => CreatorFocus::Search,
        };
    }

    /// Decide between reusing a known direct room and creating a new one.
    /// `None` when nothing is selected.
    pub fn plan<'a>(&self, known: impl IntoIterator<Item = &'a RoomSummary>) -> Option<CreatePlan> {
        let first = self.selected.first()?;

        if self.selected.len() == 1 {
            let mut known = known.into_iter();
            if let Some(existing) = known.find(|r| !r.is_group && r.has_member(&first.id)) {
                return Some(CreatePlan::Reuse(existing.clone()));
            }
        }

        let is_group = self.is_group();
        let name = if is_group {
            self.group_name.trim().to_string()
        } else {
            let full = full_name(first);
            if full.is_empty() { first.email.clone() } else { full }
        };

        Some(CreatePlan::Create(CreateRoomRequest {
            name: if name.is_empty() { "New Room".to_string() } else { name },
            members: self.selected.iter().map(|u| u.id.clone()).collect(),
            is_group,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, first: &str, last: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            firstname: first.to_string(),
            lastname: last.to_string(),
            email: format!("{}@example.com", id),
            avatar_url: None,
        }
    }

    fn no_rooms() -> Vec<RoomSummary> {
        Vec::new()
    }

    fn direct_room(id: &str, me: &str, other: &str) -> RoomSummary {
        RoomSummary {
            id: id.to_string(),
            name: other.to_string(),
            is_group: false,
            members: vec![user(me, "Me", ""), user(other, "Other", "")],
            last_message: None,
            last_message_at: None,
            last_message_sender_id: None,
            delivered_to: Vec::new(),
            seen_by: Vec::new(),
        }
    }

    #[test]
    fn nothing_selected_has_no_plan() {
        let creator = RoomCreator::new();
        assert!(creator.plan(&no_rooms()).is_none());
    }

    #[test]
    fn existing_direct_room_is_reused() {
        let mut creator = RoomCreator::new();
        creator.toggle(&user("a", "Ann", "Lee"));
        let rooms = vec![direct_room("r9", "me", "a")];
        match creator.plan(&rooms) {
            Some(CreatePlan::Reuse(room)) => assert_eq!(room.id, "r9"),
            other => panic!("expected reuse, got {:?}", other),
        }
    }

    #[test]
    fn group_rooms_are_not_reused_for_direct_chats() {
        let mut creator = RoomCreator::new();
        creator.toggle(&user("a", "Ann", "Lee"));
        let mut group = direct_room("g1", "me", "a");
        group.is_group = true;
        match creator.plan(&[group]) {
            Some(CreatePlan::Create(req)) => {
                assert_eq!(req.name, "Ann Lee");
                assert_eq!(req.members, vec!["a".to_string()]);
                assert!(!req.is_group);
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn direct_name_falls_back_to_email() {
        let mut creator = RoomCreator::new();
        creator.toggle(&user("a", "", ""));
        match creator.plan(&no_rooms()) {
            Some(CreatePlan::Create(req)) => assert_eq!(req.name, "a@example.com"),
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn group_uses_typed_name_or_default() {
        let mut creator = RoomCreator::new();
        creator.toggle(&user("a", "Ann", ""));
        creator.toggle(&user("b", "Bob", ""));
        let Some(CreatePlan::Create(req)) = creator.plan(&no_rooms()) else {
            panic!("expected create");
        };
        assert!(req.is_group);
        assert_eq!(req.name, "New Room");

        creator.group_name = "  Team  ".into();
        let Some(CreatePlan::Create(req)) = creator.plan(&no_rooms()) else {
            panic!("expected create");
        };
        assert_eq!(req.name, "Team");
    }

    #[test]
    fn toggle_twice_deselects() {
        let mut creator = RoomCreator::new();
        let ann = user("a", "Ann", "");
        creator.toggle(&ann);
        assert!(creator.is_selected("a"));
        creator.toggle(&ann);
        assert!(creator.selected().is_empty());
    }

    #[test]
    fn stale_search_results_are_dropped() {
        let mut creator = RoomCreator::new();
        creator.query = "an".into();
        let old = creator.search();
        creator.query = "ann".into();
        let new = creator.search();
        assert!(!creator.apply_search(&old, vec![user("x", "X", "")]));
        assert!(creator.apply_search(&new, vec![user("a", "Ann", "")]));
        assert_eq!(creator.users().len(), 1);
        assert_eq!(new.query, "ann");
    }
}

//! Message pane state: history of the open room and optimistic sends.

use chrono::Utc;
use tracing::debug;

use crate::model::{Message, RoomPatch, RoomSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Shown locally, request not answered yet
    Pending,
    /// Request failed; the bubble stays with this marker
    Failed,
    Confirmed,
}

/// A message stored for display
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub message: Message,
    pub state: SendState,
}

/// Receipt marker drawn next to the current user's messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Pending,
    Failed,
    Sent,
    Delivered,
    Seen,
}

impl Tick {
    pub fn glyph(self) -> &'static str {
        match self {
            Tick::Pending => "\u{2026}",
            Tick::Failed => "!",
            Tick::Sent => "\u{2713}",
            Tick::Delivered | Tick::Seen => "\u{2713}\u{2713}",
        }
    }
}

/// Seen beats delivered beats sent. Only ids other than the author count.
pub fn receipt_tick(author: &str, delivered_to: &[String], seen_by: &[String]) -> Tick {
    if seen_by.iter().any(|id| id != author) {
        Tick::Seen
    } else if delivered_to.iter().any(|id| id != author) {
        Tick::Delivered
    } else {
        Tick::Sent
    }
}

/// `None` for messages the current user did not write
pub fn message_tick(msg: &DisplayMessage, me: &str) -> Option<Tick> {
    if msg.message.sender_id != me {
        return None;
    }
    Some(match msg.state {
        SendState::Pending => Tick::Pending,
        SendState::Failed => Tick::Failed,
        SendState::Confirmed => receipt_tick(me, &msg.message.delivered_to, &msg.message.seen_by),
    })
}

/// Tick for a room's last message, when the current user sent it
pub fn room_tick(room: &RoomSummary, me: &str) -> Option<Tick> {
    let has_message = room.last_message.as_deref().is_some_and(|m| !m.is_empty());
    if !has_message || room.last_message_sender_id.as_deref() != Some(me) {
        return None;
    }
    Some(receipt_tick(me, &room.delivered_to, &room.seen_by))
}

/// Identifies a history load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub room_id: String,
    pub seq: u64,
}

/// Identifies an optimistic send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub room_id: String,
    pub temp_id: String,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct MessagePane {
    room: Option<RoomSummary>,
    messages: Vec<DisplayMessage>,
    loading: bool,
    load_seq: u64,
    next_local_id: u64,
    pub scroll_offset: usize,
}

impl MessagePane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self) -> Option<&RoomSummary> {
        self.room.as_ref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.id.as_str())
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Open a room, dropping whatever was shown before
    pub fn open(&mut self, room: RoomSummary) -> LoadTicket {
        self.load_seq += 1;
        let ticket = LoadTicket {
            room_id: room.id.clone(),
            seq: self.load_seq,
        };
        self.room = Some(room);
        self.messages.clear();
        self.scroll_offset = 0;
        self.loading = true;
        ticket
    }

    pub fn close(&mut self) {
        self.room = None;
        self.messages.clear();
        self.loading = false;
        self.scroll_offset = 0;
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.seq == self.load_seq && self.room_id() == Some(ticket.room_id.as_str())
    }

    /// Replace the history. Returns false when the room changed meanwhile.
    pub fn apply_history(&mut self, ticket: &LoadTicket, history: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            debug!("Dropped stale history for {}", ticket.room_id);
            return false;
        }
        // Sends made while the history was loading stay at the bottom,
        // including ones already confirmed that the history predates
        let local: Vec<DisplayMessage> = self
            .messages
            .drain(..)
            .filter(|m| {
                m.state != SendState::Confirmed || !history.iter().any(|h| h.id == m.message.id)
            })
            .collect();
        self.messages = history
            .into_iter()
            .map(|message| DisplayMessage {
                message,
                state: SendState::Confirmed,
            })
            .collect();
        self.messages.extend(local);
        self.loading = false;
        true
    }

    pub fn history_failed(&mut self, ticket: &LoadTicket) {
        if self.is_current(ticket) {
            self.loading = false;
        }
    }

    /// Append a pending copy of `content` and return the ticket for the
    /// request. Blank input or no open room yields `None`.
    pub fn send(&mut self, content: &str, sender_id: &str) -> Option<SendTicket> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let room_id = self.room_id()?.to_string();

        self.next_local_id += 1;
        let temp_id = format!("local-{}", self.next_local_id);
        self.messages.push(DisplayMessage {
            message: Message {
                id: temp_id.clone(),
                room_id: room_id.clone(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
                delivered_to: Vec::new(),
                seen_by: Vec::new(),
            },
            state: SendState::Pending,
        });
        self.scroll_offset = 0;

        Some(SendTicket {
            room_id,
            temp_id,
            content: content.to_string(),
        })
    }

    /// Swap the temporary record for the server's and build the summary
    /// patch for the room list.
    pub fn confirm_sent(&mut self, ticket: &SendTicket, message: Message) -> RoomPatch {
        let patch = RoomPatch::from_message(&ticket.room_id, &message);
        if let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.message.id == ticket.temp_id && m.message.room_id == ticket.room_id)
        {
            *slot = DisplayMessage {
                message,
                state: SendState::Confirmed,
            };
        }
        if let Some(room) = self.room.as_mut().filter(|r| r.id == ticket.room_id) {
            room.apply(&patch);
        }
        patch
    }

    pub fn send_failed(&mut self, ticket: &SendTicket) {
        if let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.message.id == ticket.temp_id && m.message.room_id == ticket.room_id)
        {
            slot.state = SendState::Failed;
        }
    }

    pub fn scroll_up(&mut self) {
        if self.scroll_offset + 1 < self.messages.len() {
            self.scroll_offset += 1;
        }
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }
}

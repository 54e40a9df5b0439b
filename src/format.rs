use chrono::{DateTime, Datelike, Local, TimeZone, Utc};

use crate::model::{RoomSummary, UserSummary};

/// "Just now", "5 min ago", "3 hr ago", then a calendar date in local time
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    relative_time_in(at, now, &Local)
}

fn relative_time_in<Tz: TimeZone>(at: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let diff = (now - at).num_seconds();
    if diff < 60 {
        return "Just now".to_string();
    } else if diff < 3600 {
        return format!("{} min ago", diff / 60);
    } else if diff < 86_400 {
        return format!("{} hr ago", diff / 3600);
    }
    let (at, now) = (at.with_timezone(tz), now.with_timezone(tz));
    if at.year() == now.year() {
        at.format("%b %-d").to_string()
    } else {
        at.format("%b %-d, %Y").to_string()
    }
}

/// Wall-clock time for a message bubble
pub fn clock_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

pub fn full_name(user: &UserSummary) -> String {
    format!("{} {}", user.firstname, user.lastname).trim().to_string()
}

/// How a room member is labelled for the current user
pub fn member_label(member: &UserSummary, me: &str) -> String {
    if member.id == me {
        return "You".to_string();
    }
    let name = full_name(member);
    if name.is_empty() { member.email.clone() } else { name }
}

pub fn initials(user: &UserSummary) -> String {
    let s: String = [&user.firstname, &user.lastname]
        .iter()
        .filter_map(|part| part.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    if s.is_empty() { "?".to_string() } else { s }
}

/// Title for a room row or chat header
pub fn room_title(room: &RoomSummary, me: &str) -> String {
    if !room.name.trim().is_empty() {
        return room.name.clone();
    }
    room.other_member(me)
        .map(|m| member_label(m, me))
        .unwrap_or_else(|| "Chat".to_string())
}

/// Sender label inside a room
pub fn sender_label(room: Option<&RoomSummary>, sender_id: &str, me: &str) -> String {
    if sender_id == me {
        return "You".to_string();
    }
    room.and_then(|r| r.members.iter().find(|m| m.id == sender_id))
        .map(|m| member_label(m, me))
        .unwrap_or_else(|| sender_id.to_string())
}

use chrono::Utc;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, Focus, NoticeKind, Overlay, SIGNUP_FIELDS, Screen};
use crate::creator::CreatorFocus;
use crate::format::{clock_time, full_name, initials, relative_time, room_title, sender_label};
use crate::messages::{SendState, message_tick, room_tick};
use crate::rooms::Tab;

// --- Theme system ---

#[derive(Clone)]
pub struct Theme {
    pub name: &'static str,
    pub accent: Color,
    pub dimmed: Color,
    pub text: Color,
    pub text_dim: Color,
    pub status_ok: Color,
    pub status_err: Color,
    pub status_warn: Color,
    pub status_bg: Color,
    pub highlight_bg: Color,
}

fn default_theme() -> Theme {
    Theme {
        name: "Default",
        accent: Color::Cyan,
        dimmed: Color::DarkGray,
        text: Color::White,
        text_dim: Color::Gray,
        status_ok: Color::Green,
        status_err: Color::Red,
        status_warn: Color::Yellow,
        status_bg: Color::Black,
        highlight_bg: Color::DarkGray,
    }
}

pub fn builtin_themes() -> Vec<Theme> {
    vec![
        default_theme(),
        Theme {
            name: "Dracula",
            accent: Color::Rgb(189, 147, 249),
            dimmed: Color::Rgb(98, 114, 164),
            text: Color::Rgb(248, 248, 242),
            text_dim: Color::Rgb(189, 189, 189),
            status_ok: Color::Rgb(80, 250, 123),
            status_err: Color::Rgb(255, 85, 85),
            status_warn: Color::Rgb(241, 250, 140),
            status_bg: Color::Rgb(40, 42, 54),
            highlight_bg: Color::Rgb(68, 71, 90),
        },
        Theme {
            name: "Nord",
            accent: Color::Rgb(136, 192, 208),
            dimmed: Color::Rgb(76, 86, 106),
            text: Color::Rgb(236, 239, 244),
            text_dim: Color::Rgb(216, 222, 233),
            status_ok: Color::Rgb(163, 190, 140),
            status_err: Color::Rgb(191, 97, 106),
            status_warn: Color::Rgb(235, 203, 139),
            status_bg: Color::Rgb(46, 52, 64),
            highlight_bg: Color::Rgb(59, 66, 82),
        },
    ]
}

/// Unknown names fall back to the default theme
pub fn theme_by_name(name: &str) -> Theme {
    builtin_themes()
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .unwrap_or_else(default_theme)
}

// --- Drawing ---

pub fn draw(f: &mut Frame, app: &App) {
    let size = f.area();

    match app.screen {
        Screen::Login => draw_login_screen(f, app),
        Screen::Signup => draw_signup_screen(f, app),
        Screen::Rooms => {
            if size.width >= 60 {
                draw_two_column(f, app, size);
            } else {
                draw_single_column(f, app, size);
            }

            match app.overlay {
                Overlay::Help => draw_help_overlay(f, app),
                Overlay::NewChat => draw_creator_overlay(f, app),
                Overlay::ConfirmLogout => draw_logout_overlay(f, app),
                Overlay::None => {}
            }
        }
    }

    draw_notice(f, app);
}

fn draw_two_column(f: &mut Frame, app: &App, area: Rect) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(30)])
        .split(vertical[0]);

    draw_rooms_panel(f, app, columns[0]);
    draw_chat_panel(f, app, columns[1]);
    draw_status_bar(f, app, vertical[1]);
}

fn draw_single_column(f: &mut Frame, app: &App, area: Rect) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    match app.focus {
        Focus::Rooms => draw_rooms_panel(f, app, vertical[0]),
        _ => draw_chat_panel(f, app, vertical[0]),
    }
    draw_status_bar(f, app, vertical[1]);
}

fn border_style(focused: bool, theme: &Theme) -> Style {
    if focused {
        Style::default().fg(theme.accent)
    } else {
        Style::default().fg(theme.dimmed)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn draw_rooms_panel(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let focused = app.focus == Focus::Rooms;
    let block = Block::default()
        .title(" Chats ")
        .borders(Borders::ALL)
        .border_style(border_style(focused, theme));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // tabs
            Constraint::Length(1), // spacer
            Constraint::Min(1),    // rooms
            Constraint::Length(1), // footer
        ])
        .split(inner);

    // Tabs
    let active = app.rooms.active_tab();
    let mut tab_spans = Vec::new();
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let style = if *tab == active {
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(theme.text_dim)
        };
        tab_spans.push(Span::styled(format!(" {}:{} ", i + 1, tab.label()), style));
    }
    f.render_widget(Paragraph::new(Line::from(tab_spans)), rows[0]);

    // Two rows per room
    let viewport = (rows[2].height as usize / 2).max(1);
    app.rooms_viewport.set(viewport);

    let visible = app.rooms.visible();
    if visible.is_empty() {
        let text = if app.rooms.is_fetching() {
            " Loading chats..."
        } else {
            " No chats yet\n\n Press 'n' to\n start one"
        };
        f.render_widget(
            Paragraph::new(text).style(Style::default().fg(theme.dimmed)),
            rows[2],
        );
        return;
    }

    let me = app.session.user_id().unwrap_or("");
    let now = Utc::now();
    let width = rows[2].width as usize;
    let offset = app.rooms_offset();

    let items: Vec<ListItem> = visible
        .iter()
        .enumerate()
        .skip(offset)
        .take(viewport)
        .map(|(i, room)| {
            let prefix = if room.is_group { "#" } else { "@" };
            let time = room
                .last_message_at
                .map(|at| relative_time(at, now))
                .unwrap_or_default();
            let name_width = width.saturating_sub(time.chars().count() + 3);
            let title = truncate(&room_title(room, me), name_width);
            let pad = width.saturating_sub(title.chars().count() + time.chars().count() + 2);

            let is_open = app.pane.room_id() == Some(room.id.as_str());
            let is_selected = i == app.selected_room;
            let style = if is_selected && focused {
                Style::default().fg(theme.text).bg(theme.highlight_bg)
            } else if is_open {
                Style::default().fg(theme.accent)
            } else {
                Style::default().fg(theme.text_dim)
            };

            let header = Line::from(vec![
                Span::styled(
                    format!(" {}{}", prefix, title),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(" ".repeat(pad)),
                Span::styled(time, Style::default().fg(theme.dimmed)),
            ]);

            let tick = room_tick(room, me)
                .map(|t| format!("{} ", t.glyph()))
                .unwrap_or_default();
            let preview = match room.last_message.as_deref() {
                Some(m) if !m.is_empty() => m,
                _ => "No messages yet",
            };
            let preview = truncate(preview, width.saturating_sub(3 + tick.chars().count()));
            let detail = Line::from(vec![
                Span::styled(format!("  {}", tick), Style::default().fg(theme.status_ok)),
                Span::styled(preview, Style::default().fg(theme.dimmed)),
            ]);

            ListItem::new(vec![header, detail]).style(style)
        })
        .collect();

    f.render_widget(List::new(items), rows[2]);

    let footer = if app.rooms.is_fetching() {
        " Loading more..."
    } else {
        ""
    };
    f.render_widget(
        Paragraph::new(footer).style(Style::default().fg(theme.status_warn)),
        rows[3],
    );
}

/// Pre-wrap text into Lines, each prefixed with `indent`, fitting within `width` columns.
fn wrap_with_indent<'a>(text: &str, indent: &str, width: usize, style: Style) -> Vec<Line<'a>> {
    let indent_w = indent.chars().count();
    let content_w = width.saturating_sub(indent_w).max(1);
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let chars: Vec<char> = raw.chars().collect();
        if chars.is_empty() {
            lines.push(Line::from(Span::styled(indent.to_string(), style)));
            continue;
        }
        for chunk in chars.chunks(content_w) {
            lines.push(Line::from(Span::styled(
                format!("{}{}", indent, chunk.iter().collect::<String>()),
                style,
            )));
        }
    }
    lines
}

fn wrapped_height(text: &str, indent_chars: usize, width: usize) -> usize {
    let content_w = width.saturating_sub(indent_chars).max(1);
    text.split('\n')
        .map(|raw| {
            let n = raw.chars().count();
            if n == 0 { 1 } else { n.div_ceil(content_w) }
        })
        .sum()
}

/// First index of the messages that fit in `budget` rows counting up from
/// the newest, plus the rows they use. The newest one is always included.
fn fit_from_bottom(heights: &[usize], budget: usize) -> (usize, usize) {
    let mut used = 0usize;
    let mut start = heights.len();
    for (i, &h) in heights.iter().enumerate().rev() {
        if used + h > budget && start < heights.len() {
            break;
        }
        used += h;
        start = i;
        if used > budget {
            break;
        }
    }
    (start, used)
}

fn draw_chat_panel(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let focused = app.focus == Focus::Chat || app.focus == Focus::Input;
    let me = app.session.user_id().unwrap_or("");

    let title = match app.pane.room() {
        Some(room) if room.is_group => {
            format!(" {} · {} members ", room_title(room, me), room.members.len())
        }
        Some(room) => format!(" {} ", room_title(room, me)),
        None => " Chat ".to_string(),
    };

    // Input box grows with wrapped text
    let inner_width = (area.width as usize).saturating_sub(2);
    let input_len = app.input.chars().count();
    let input_lines = if inner_width == 0 || input_len == 0 {
        1
    } else {
        input_len.div_ceil(inner_width)
    };
    let max_input_lines = ((area.height as usize).saturating_sub(5)) / 2;
    let input_height = (input_lines.clamp(1, max_input_lines.max(1)) as u16) + 2;

    let chat_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(input_height)])
        .split(area);
    let msg_area = chat_layout[0];
    let input_area = chat_layout[1];

    let msg_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style(focused, theme));

    if app.pane.room().is_none() {
        let welcome = Paragraph::new(
            "\n  Select a chat to start messaging\n\n  Enter   open chat\n  n       new chat\n  1/2/3   filter chats\n  L       logout\n  ?       help",
        )
        .style(Style::default().fg(theme.dimmed))
        .block(msg_block);
        f.render_widget(welcome, msg_area);
        return;
    }

    let messages = app.pane.messages();
    if messages.is_empty() {
        let text = if app.pane.is_loading() {
            "\n  Loading messages..."
        } else {
            "\n  No messages yet. Say hi!"
        };
        f.render_widget(
            Paragraph::new(text)
                .style(Style::default().fg(theme.dimmed))
                .block(msg_block),
            msg_area,
        );
    } else {
        let msg_height = msg_area.height.saturating_sub(2) as usize;
        let body_width = msg_area.width.saturating_sub(2) as usize;
        let end = messages.len().saturating_sub(app.pane.scroll_offset);

        let heights: Vec<usize> = messages[..end]
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                let gap = usize::from(i + 1 < end);
                1 + wrapped_height(&msg.message.content, 2, body_width) + gap
            })
            .collect();
        let (start, used_height) = fit_from_bottom(&heights, msg_height);

        let room = app.pane.room();
        let mut lines: Vec<Line> = Vec::new();
        for _ in used_height..msg_height {
            lines.push(Line::default());
        }
        for (i, msg) in messages[start..end].iter().enumerate() {
            let sender = sender_label(room, &msg.message.sender_id, me);
            let mut header = vec![
                Span::styled(
                    sender,
                    Style::default()
                        .fg(theme.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {}", clock_time(msg.message.created_at)),
                    Style::default().fg(theme.dimmed),
                ),
            ];
            if let Some(tick) = message_tick(msg, me) {
                let color = match msg.state {
                    SendState::Failed => theme.status_err,
                    SendState::Pending => theme.dimmed,
                    SendState::Confirmed => theme.status_ok,
                };
                header.push(Span::styled(format!(" {}", tick.glyph()), Style::default().fg(color)));
            }
            if msg.state == SendState::Failed {
                header.push(Span::styled(
                    " not sent",
                    Style::default().fg(theme.status_err),
                ));
            }
            lines.push(Line::from(header));

            let body_style = match msg.state {
                SendState::Pending => Style::default().fg(theme.text_dim),
                _ => Style::default().fg(theme.text),
            };
            lines.extend(wrap_with_indent(&msg.message.content, "  ", body_width, body_style));

            if start + i + 1 < end {
                lines.push(Line::default());
            }
        }

        // A message taller than the pane shows its tail
        let overflow = used_height.saturating_sub(msg_height) as u16;
        f.render_widget(
            Paragraph::new(lines).block(msg_block).scroll((overflow, 0)),
            msg_area,
        );
    }

    // Input box
    let input_focused = app.focus == Focus::Input;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(input_focused, theme))
        .title(if input_focused { " > " } else { "" });
    let input_text = Paragraph::new(app.input.as_str())
        .block(input_block)
        .wrap(Wrap { trim: false });
    f.render_widget(input_text, input_area);

    if input_focused {
        let iw = inner_width.max(1);
        f.set_cursor_position((
            input_area.x + 1 + (app.cursor_pos % iw) as u16,
            input_area.y + 1 + (app.cursor_pos / iw) as u16,
        ));
    }
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let mut spans = Vec::new();

    match app.session.user() {
        Some(user) => {
            spans.push(Span::styled("● ", Style::default().fg(theme.status_ok)));
            let name = full_name(user);
            let label = if name.is_empty() { user.email.clone() } else { name };
            spans.push(Span::raw(format!("[{}] {}  ", initials(user), label)));
        }
        None if app.session.is_authenticated() => {
            spans.push(Span::styled("● ", Style::default().fg(theme.status_warn)));
            spans.push(Span::raw("loading profile  "));
        }
        None => {
            spans.push(Span::styled("● ", Style::default().fg(theme.status_err)));
            spans.push(Span::raw("signed out  "));
        }
    }
    spans.push(Span::styled("│ ", Style::default().fg(theme.dimmed)));

    let hint = match app.focus {
        Focus::Rooms => "↑↓ select  Enter open  n new  [ ] tabs  L logout  ? help",
        Focus::Chat => "↑↓ scroll  Enter write  Esc rooms",
        Focus::Input => "Enter send  Esc back  Tab rooms",
    };
    spans.push(Span::styled(hint, Style::default().fg(theme.dimmed)));

    let status = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.status_bg));
    f.render_widget(status, area);
}

fn draw_notice(f: &mut Frame, app: &App) {
    let Some(notice) = &app.notice else {
        return;
    };
    let theme = &app.theme;
    let term = f.area();
    let width = (notice.text.chars().count() as u16 + 4).min(term.width);
    let area = Rect::new(term.x + term.width.saturating_sub(width), term.y, width, 3.min(term.height));
    f.render_widget(Clear, area);

    let color = match notice.kind {
        NoticeKind::Success => theme.status_ok,
        NoticeKind::Error => theme.status_err,
        NoticeKind::Info => theme.accent,
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));
    f.render_widget(
        Paragraph::new(notice.text.as_str())
            .style(Style::default().fg(color))
            .block(block),
        area,
    );
}

fn draw_login_screen(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let height = 11.min(f.area().height);
    let area = centered_rect(50, height, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Login ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // label
            Constraint::Length(1), // email
            Constraint::Length(1), // spacer
            Constraint::Length(1), // label
            Constraint::Length(1), // password
            Constraint::Length(1), // spacer
            Constraint::Min(1),    // error or hint
        ])
        .split(inner);

    f.render_widget(
        Paragraph::new("Email:").style(Style::default().fg(theme.text_dim)),
        fields[0],
    );
    f.render_widget(
        Paragraph::new(format!(" {}", app.login_email)).style(field_style(app.login_focus == 0, theme)),
        fields[1],
    );
    f.render_widget(
        Paragraph::new("Password:").style(Style::default().fg(theme.text_dim)),
        fields[3],
    );
    let masked = "\u{25cf}".repeat(app.login_password.chars().count());
    f.render_widget(
        Paragraph::new(format!(" {}", masked)).style(field_style(app.login_focus == 1, theme)),
        fields[4],
    );

    let hint = if let Some(err) = &app.login_error {
        Paragraph::new(err.as_str()).style(Style::default().fg(theme.status_err))
    } else if app.login_busy {
        Paragraph::new("Logging in...").style(Style::default().fg(theme.status_warn))
    } else {
        Paragraph::new("Tab: next  Enter: login  Ctrl+N: sign up  Ctrl+Q: quit")
            .style(Style::default().fg(theme.dimmed))
    };
    f.render_widget(hint.wrap(Wrap { trim: false }), fields[6]);

    if !app.login_busy {
        let (row, text) = match app.login_focus {
            0 => (fields[1], app.login_email.chars().count()),
            _ => (fields[4], app.login_password.chars().count()),
        };
        f.set_cursor_position((row.x + 1 + text as u16, row.y));
    }
}

fn draw_signup_screen(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let height = (SIGNUP_FIELDS.len() as u16 * 3 + 4).min(f.area().height);
    let area = centered_rect(50, height, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Sign up ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut constraints = Vec::new();
    for _ in SIGNUP_FIELDS {
        constraints.extend([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)]);
    }
    constraints.push(Constraint::Min(1));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (i, label) in SIGNUP_FIELDS.iter().enumerate() {
        let value = &app.signup_fields[i];
        let shown = if i == SIGNUP_FIELDS.len() - 1 {
            "\u{25cf}".repeat(value.chars().count())
        } else {
            value.clone()
        };
        f.render_widget(
            Paragraph::new(format!("{}:", label)).style(Style::default().fg(theme.text_dim)),
            rows[i * 3],
        );
        f.render_widget(
            Paragraph::new(format!(" {}", shown)).style(field_style(app.signup_focus == i, theme)),
            rows[i * 3 + 1],
        );
    }

    let hint = if let Some(err) = &app.signup_error {
        Paragraph::new(err.as_str()).style(Style::default().fg(theme.status_err))
    } else if app.signup_busy {
        Paragraph::new("Creating account...").style(Style::default().fg(theme.status_warn))
    } else {
        Paragraph::new("Tab: next  Enter: sign up  Esc: back to login")
            .style(Style::default().fg(theme.dimmed))
    };
    f.render_widget(hint.wrap(Wrap { trim: false }), rows[SIGNUP_FIELDS.len() * 3]);

    if !app.signup_busy {
        let row = rows[app.signup_focus * 3 + 1];
        let col = app.signup_fields[app.signup_focus].chars().count() as u16;
        f.set_cursor_position((row.x + 1 + col, row.y));
    }
}

fn draw_help_overlay(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let help_text = [
        "",
        "  Chats:",
        "    Up/Down          Select chat",
        "    Enter            Open chat",
        "    1 2 3  [ ]       All / Individual / Group",
        "    r                Refresh",
        "    n                New chat",
        "    L                Logout",
        "",
        "  Conversation:",
        "    Up/Down          Scroll messages",
        "    Enter            Write / send",
        "    Esc              Back",
        "",
        "  Global:",
        "    Ctrl+Q           Quit",
        "    ?                Toggle this help",
    ];

    let height = (help_text.len() as u16 + 2).min(f.area().height);
    let area = centered_rect(60, height, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent));
    let lines: Vec<Line> = help_text.iter().map(|&s| Line::from(s)).collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_logout_overlay(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let area = centered_rect(40, 5, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Logout ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.status_warn));
    f.render_widget(
        Paragraph::new("\n  Log out of this session? (y/n)")
            .style(Style::default().fg(theme.text))
            .block(block),
        area,
    );
}

fn draw_creator_overlay(f: &mut Frame, app: &App) {
    let Some(creator) = &app.creator else {
        return;
    };
    let theme = &app.theme;
    let list_rows: u16 = 8;
    let height = (list_rows + 11).min(f.area().height);
    let area = centered_rect(50, height, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" New Chat ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),         // label
            Constraint::Length(1),         // search field
            Constraint::Length(1),         // spacer
            Constraint::Length(list_rows), // users
            Constraint::Length(1),         // selected
            Constraint::Length(1),         // group name label
            Constraint::Length(1),         // group name field
            Constraint::Min(1),            // error/hint
        ])
        .split(inner);

    f.render_widget(
        Paragraph::new("  Search users:").style(Style::default().fg(theme.text_dim)),
        fields[0],
    );
    f.render_widget(
        Paragraph::new(format!("  {}", creator.query))
            .style(field_style(creator.focus == CreatorFocus::Search, theme)),
        fields[1],
    );

    // Users, scrolled to keep the cursor visible
    let users = creator.users();
    if users.is_empty() {
        f.render_widget(
            Paragraph::new("  No users found").style(Style::default().fg(theme.dimmed)),
            fields[3],
        );
    } else {
        let rows = list_rows as usize;
        let offset = creator.cursor.saturating_sub(rows.saturating_sub(1));
        let width = fields[3].width as usize;
        let items: Vec<ListItem> = users
            .iter()
            .enumerate()
            .skip(offset)
            .take(rows)
            .map(|(i, user)| {
                let mark = if creator.is_selected(&user.id) { "[x]" } else { "[ ]" };
                let name = full_name(user);
                let label = if name.is_empty() {
                    user.email.clone()
                } else {
                    format!("{} <{}>", name, user.email)
                };
                let style = if i == creator.cursor && creator.focus == CreatorFocus::Users {
                    Style::default().fg(theme.text).bg(theme.highlight_bg)
                } else {
                    Style::default().fg(theme.text_dim)
                };
                ListItem::new(truncate(&format!("  {} {}", mark, label), width)).style(style)
            })
            .collect();
        f.render_widget(List::new(items), fields[3]);
    }

    let selected: Vec<String> = creator.selected().iter().map(full_name).collect();
    let summary = if selected.is_empty() {
        "  Nobody selected".to_string()
    } else {
        format!("  With: {}", selected.join(", "))
    };
    f.render_widget(
        Paragraph::new(truncate(&summary, fields[4].width as usize))
            .style(Style::default().fg(theme.accent)),
        fields[4],
    );

    if creator.is_group() {
        f.render_widget(
            Paragraph::new("  Group name:").style(Style::default().fg(theme.text_dim)),
            fields[5],
        );
        f.render_widget(
            Paragraph::new(format!("  {}", creator.group_name))
                .style(field_style(creator.focus == CreatorFocus::GroupName, theme)),
            fields[6],
        );
    }

    let hint = if let Some(err) = &creator.error {
        Paragraph::new(format!("  {}", err)).style(Style::default().fg(theme.status_err))
    } else if creator.busy {
        Paragraph::new("  Creating chat...").style(Style::default().fg(theme.status_warn))
    } else {
        Paragraph::new("  Tab: next  Space: select  Enter: create  Esc: cancel")
            .style(Style::default().fg(theme.dimmed))
    };
    f.render_widget(hint.wrap(Wrap { trim: false }), fields[7]);

    if !creator.busy {
        let (row, len) = match creator.focus {
            CreatorFocus::Search => (fields[1], creator.query.chars().count()),
            CreatorFocus::GroupName if creator.is_group() => {
                (fields[6], creator.group_name.chars().count())
            }
            _ => return,
        };
        f.set_cursor_position((row.x + 2 + len as u16, row.y));
    }
}

fn field_style(focused: bool, theme: &Theme) -> Style {
    if focused {
        Style::default().fg(theme.text).bg(theme.highlight_bg)
    } else {
        Style::default().fg(theme.text_dim)
    }
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let popup_width = (area.width * percent_x / 100).min(area.width);
    let popup_height = height.min(area.height);
    let x = (area.width.saturating_sub(popup_width)) / 2;
    let y = (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(area.x + x, area.y + y, popup_width, popup_height)
}

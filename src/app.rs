use anyhow::{Result, anyhow};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::cell::Cell;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{ApiClient, ApiError, Credential, LoginResponse, SignupRequest};
use crate::config::Config;
use crate::creator::{CreatePlan, CreatorFocus, RoomCreator};
use crate::event::{ApiEvent, AppEvent, TimerEvent, spawn_input_reader, spawn_unauthorized_bridge};
use crate::messages::MessagePane;
use crate::model::RoomSummary;
use crate::rooms::{FetchTicket, RoomCache, SCROLL_THRESHOLD_ROWS, Tab, near_end};
use crate::session::{Session, SessionStore, interpret_login, interpret_signup};
use crate::timer::{Debouncer, send_after};
use crate::ui::{self, Theme};

/// Pause between a successful login and showing the room list
pub const LOGIN_REDIRECT_DELAY: Duration = Duration::from_secs(1);
/// Pause between a session-expired notice and the login screen
pub const SESSION_REDIRECT_DELAY: Duration = Duration::from_secs(2);
/// Coalescing window for the room refresh that follows a send
pub const REFRESH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Login,
    Signup,
    Rooms,
}

/// Which panel has focus
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Focus {
    Rooms,
    Chat,
    Input,
}

/// Which overlay is showing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlay {
    None,
    Help,
    NewChat,
    ConfirmLogout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// Transient message in the corner of the screen
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    shown_at: Instant,
}

pub const SIGNUP_FIELDS: [&str; 4] = ["First name", "Last name", "Email", "Password"];

pub struct App {
    pub config: Config,
    pub theme: Theme,
    pub screen: Screen,
    pub focus: Focus,
    pub overlay: Overlay,
    pub running: bool,

    pub session: Session,

    // Room list state
    pub rooms: RoomCache,
    pub selected_room: usize,
    /// Room rows that fit in the list, written by the renderer
    pub rooms_viewport: Cell<usize>,

    // Chat state
    pub pane: MessagePane,
    pub creator: Option<RoomCreator>,

    // Input state
    pub input: String,
    pub cursor_pos: usize,

    // Login form state
    pub login_email: String,
    pub login_password: String,
    pub login_focus: usize, // 0=email, 1=password
    pub login_error: Option<String>,
    pub login_busy: bool,

    // Signup form state
    pub signup_fields: [String; 4],
    pub signup_focus: usize,
    pub signup_error: Option<String>,
    pub signup_busy: bool,

    pub notice: Option<Notice>,

    api: ApiClient,
    refresh: Debouncer,

    // Channels
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
    unauthorized_rx: Option<mpsc::UnboundedReceiver<()>>,
}

impl App {
    pub fn new(config: Config, store: SessionStore, theme: Theme) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (unauthorized_tx, unauthorized_rx) = mpsc::unbounded_channel();
        let credential = Credential::default();
        let api = ApiClient::new(
            &config.api_url,
            Duration::from_secs(config.request_timeout_secs),
            credential.clone(),
        )?
        .with_unauthorized_signal(unauthorized_tx);

        Ok(Self {
            config,
            theme,
            screen: Screen::Login,
            focus: Focus::Rooms,
            overlay: Overlay::None,
            running: true,
            session: Session::new(store, credential),
            rooms: RoomCache::new(),
            selected_room: 0,
            rooms_viewport: Cell::new(1),
            pane: MessagePane::new(),
            creator: None,
            input: String::new(),
            cursor_pos: 0,
            login_email: String::new(),
            login_password: String::new(),
            login_focus: 0,
            login_error: None,
            login_busy: false,
            signup_fields: Default::default(),
            signup_focus: 0,
            signup_error: None,
            signup_busy: false,
            notice: None,
            api,
            refresh: Debouncer::new(REFRESH_DEBOUNCE),
            tx,
            rx: Some(rx),
            unauthorized_rx: Some(unauthorized_rx),
        })
    }

    /// Restore a saved session, or start at the login screen
    pub fn start(&mut self) {
        if self.session.restore() {
            self.enter_rooms_screen();
        } else {
            self.screen = Screen::Login;
        }
    }

    /// Main event loop
    pub async fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
        let mut rx = self
            .rx
            .take()
            .ok_or_else(|| anyhow!("event loop already running"))?;

        // Start input reader
        spawn_input_reader(self.tx.clone());

        // Bridge 401 signals to app events
        if let Some(urx) = self.unauthorized_rx.take() {
            spawn_unauthorized_bridge(urx, self.tx.clone());
        }

        while self.running {
            terminal.draw(|f| ui::draw(f, self))?;

            match rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }

        Ok(())
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Resize(_, _) => {} // ratatui handles this on next draw
            AppEvent::Api(ev) => self.handle_api_event(ev),
            AppEvent::Timer(ev) => self.handle_timer(ev),
            AppEvent::Unauthorized => self.handle_unauthorized(),
            AppEvent::Tick => self.expire_notice(),
        }
    }

    // --- Notices ---

    pub fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    fn expire_notice(&mut self) {
        if self
            .notice
            .as_ref()
            .is_some_and(|n| n.shown_at.elapsed() >= NOTICE_TTL)
        {
            self.notice = None;
        }
    }

    // --- Request plumbing ---

    fn spawn_api<F>(&self, request: F)
    where
        F: Future<Output = ApiEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = request.await;
            let _ = tx.send(AppEvent::Api(event));
        });
    }

    fn request_rooms(&self, ticket: Option<FetchTicket>) {
        let Some(ticket) = ticket else {
            return;
        };
        let api = self.api.clone();
        let limit = self.config.page_size;
        self.spawn_api(async move {
            let result = api.list_rooms(ticket.tab.query_type(), ticket.page, limit).await;
            ApiEvent::RoomsPage { ticket, result }
        });
    }

    fn request_me(&self) {
        let api = self.api.clone();
        self.spawn_api(async move { ApiEvent::Me(api.me().await) });
    }

    fn request_user_search(&mut self) {
        let Some(creator) = self.creator.as_mut() else {
            return;
        };
        let ticket = creator.search();
        let api = self.api.clone();
        let limit = self.config.user_search_limit;
        self.spawn_api(async move {
            let result = api.search_users(&ticket.query, 1, limit).await;
            ApiEvent::Users { ticket, result }
        });
    }

    /// Report a failed read or write unless it was a 401, which has its own
    /// global handling.
    fn report_failure(&mut self, what: &str, err: &ApiError) {
        if err.is_unauthorized() {
            return;
        }
        error!("{}: {}", what, err);
        self.notify(NoticeKind::Error, what);
    }

    // --- Screens ---

    fn enter_rooms_screen(&mut self) {
        self.screen = Screen::Rooms;
        self.focus = Focus::Rooms;
        self.overlay = Overlay::None;
        self.login_busy = false;
        self.login_password.clear();
        if self.session.user().is_none() {
            self.request_me();
        }
        let ticket = self.rooms.select_tab(self.rooms.active_tab());
        self.request_rooms(ticket);
    }

    fn reset_to_login(&mut self) {
        self.screen = Screen::Login;
        self.overlay = Overlay::None;
        self.focus = Focus::Rooms;
        self.rooms.clear();
        self.pane.close();
        self.creator = None;
        self.selected_room = 0;
        self.input.clear();
        self.cursor_pos = 0;
        self.login_password.clear();
        self.login_focus = 0;
        self.login_busy = false;
        self.refresh.cancel();
    }

    fn logout(&mut self) {
        if let Err(e) = self.session.logout() {
            error!("Failed to clear session: {}", e);
        }
        self.reset_to_login();
        self.notify(NoticeKind::Info, "Logged out");
    }

    fn handle_unauthorized(&mut self) {
        if !self.session.on_unauthorized() {
            return;
        }
        self.refresh.cancel();
        self.notify(NoticeKind::Error, "Session expired, please login again");
        send_after(
            self.tx.clone(),
            SESSION_REDIRECT_DELAY,
            AppEvent::Timer(TimerEvent::SessionRedirect),
        );
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::EnterRooms => {
                if self.session.is_authenticated() && self.screen != Screen::Rooms {
                    self.enter_rooms_screen();
                }
            }
            TimerEvent::SessionRedirect => {
                if !self.session.is_authenticated() {
                    self.reset_to_login();
                }
            }
            TimerEvent::RefreshRooms => {
                if self.screen == Screen::Rooms && self.session.is_authenticated() {
                    let ticket = self.rooms.invalidate_active();
                    self.request_rooms(ticket);
                }
            }
        }
    }

    // --- API results ---

    fn handle_api_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Login(result) => self.finish_login(result),
            ApiEvent::Signup { email, result } => {
                self.signup_busy = false;
                match interpret_signup(result) {
                    Ok(text) => {
                        info!("Signed up {}", email);
                        self.signup_fields = Default::default();
                        self.signup_error = None;
                        self.login_email = email;
                        self.login_focus = 1;
                        self.screen = Screen::Login;
                        self.notify(NoticeKind::Success, text);
                    }
                    Err(text) => {
                        warn!("Signup failed: {}", text);
                        self.signup_error = Some(text.clone());
                        self.notify(NoticeKind::Error, text);
                    }
                }
            }
            ApiEvent::Me(result) => match result {
                Ok(user) => {
                    if let Err(e) = self.session.set_user(user) {
                        error!("Failed to save user: {}", e);
                    }
                }
                Err(e) => self.report_failure("Failed to load profile", &e),
            },
            ApiEvent::RoomsPage { ticket, result } => match result {
                Ok(page) => {
                    if self.rooms.apply_page(ticket, page) {
                        self.clamp_room_selection();
                    }
                }
                Err(e) => {
                    if self.rooms.fetch_failed(ticket) {
                        self.report_failure("Failed to fetch rooms", &e);
                    }
                }
            },
            ApiEvent::History { ticket, result } => match result {
                Ok(history) => {
                    self.pane.apply_history(&ticket, history);
                }
                Err(e) => {
                    self.pane.history_failed(&ticket);
                    self.report_failure("Failed to load messages", &e);
                }
            },
            ApiEvent::Sent { ticket, result } => match result {
                Ok(message) => {
                    let patch = self.pane.confirm_sent(&ticket, message);
                    self.rooms.on_message_sent(&patch);
                    self.refresh
                        .schedule(&self.tx, AppEvent::Timer(TimerEvent::RefreshRooms));
                }
                Err(e) => {
                    self.pane.send_failed(&ticket);
                    self.report_failure("Failed to send message", &e);
                }
            },
            ApiEvent::Users { ticket, result } => match result {
                Ok(users) => {
                    if let Some(creator) = self.creator.as_mut() {
                        creator.apply_search(&ticket, users);
                    }
                }
                Err(e) => self.report_failure("Failed to fetch users", &e),
            },
            ApiEvent::RoomCreated(result) => match result {
                Ok(room) => {
                    info!("Created room {}", room.id);
                    self.overlay = Overlay::None;
                    self.creator = None;
                    let ticket = self.rooms.on_room_created(room.clone());
                    self.request_rooms(ticket);
                    self.notify(NoticeKind::Success, "Room created!");
                    self.open_room(room);
                }
                Err(e) => {
                    if let Some(creator) = self.creator.as_mut() {
                        creator.busy = false;
                        creator.error = Some(
                            e.server_message()
                                .unwrap_or("Failed to create room")
                                .to_string(),
                        );
                    }
                    if !e.is_unauthorized() {
                        error!("Error creating room: {}", e);
                    }
                }
            },
        }
    }

    fn finish_login(&mut self, result: Result<LoginResponse, ApiError>) {
        match interpret_login(result) {
            Ok((token, user)) => {
                info!("Logged in as {}", user.email);
                if let Err(e) = self.session.establish(&token, user) {
                    error!("Failed to save session: {}", e);
                }
                self.login_error = None;
                self.notify(NoticeKind::Success, "Login successful!");
                send_after(
                    self.tx.clone(),
                    LOGIN_REDIRECT_DELAY,
                    AppEvent::Timer(TimerEvent::EnterRooms),
                );
            }
            Err(text) => {
                warn!("Login failed: {}", text);
                self.login_busy = false;
                self.login_error = Some(text.clone());
                self.notify(NoticeKind::Error, text);
            }
        }
    }

    // --- Rooms ---

    fn clamp_room_selection(&mut self) {
        let len = self.rooms.visible().len();
        if self.selected_room >= len {
            self.selected_room = len.saturating_sub(1);
        }
    }

    /// First visible row of the room list
    pub fn rooms_offset(&self) -> usize {
        let viewport = self.rooms_viewport.get().max(1);
        self.selected_room.saturating_sub(viewport - 1)
    }

    fn select_tab(&mut self, tab: Tab) {
        if tab == self.rooms.active_tab() && !self.rooms.visible().is_empty() {
            return;
        }
        self.selected_room = 0;
        let ticket = self.rooms.select_tab(tab);
        self.request_rooms(ticket);
    }

    fn maybe_load_more(&mut self) {
        let len = self.rooms.visible().len();
        let viewport = self.rooms_viewport.get().max(1);
        if near_end(len, self.rooms_offset(), viewport, SCROLL_THRESHOLD_ROWS) {
            let ticket = self.rooms.on_scroll_near_end();
            self.request_rooms(ticket);
        }
    }

    fn open_room(&mut self, room: RoomSummary) {
        if let Some(idx) = self.rooms.visible().iter().position(|r| r.id == room.id) {
            self.selected_room = idx;
        }
        let ticket = self.pane.open(room);
        self.focus = Focus::Input;
        let api = self.api.clone();
        self.spawn_api(async move {
            let result = api.messages(&ticket.room_id).await;
            ApiEvent::History { ticket, result }
        });
    }

    fn send_current_message(&mut self) {
        let Some(me) = self.session.user_id().map(str::to_string) else {
            self.notify(NoticeKind::Info, "Profile still loading, try again");
            return;
        };
        let Some(ticket) = self.pane.send(&self.input, &me) else {
            return;
        };
        self.input.clear();
        self.cursor_pos = 0;

        let api = self.api.clone();
        self.spawn_api(async move {
            let result = api.send_message(&ticket.room_id, &ticket.content).await;
            ApiEvent::Sent { ticket, result }
        });
    }

    fn open_creator(&mut self) {
        self.creator = Some(RoomCreator::new());
        self.overlay = Overlay::NewChat;
        self.request_user_search();
    }

    fn create_room(&mut self) {
        let Some(creator) = self.creator.as_mut() else {
            return;
        };
        if creator.busy {
            return;
        }
        let Some(plan) = creator.plan(self.rooms.known_rooms()) else {
            return;
        };
        match plan {
            CreatePlan::Reuse(room) => {
                info!("Reusing direct room {}", room.id);
                self.overlay = Overlay::None;
                self.creator = None;
                self.open_room(room);
            }
            CreatePlan::Create(request) => {
                creator.busy = true;
                creator.error = None;
                let api = self.api.clone();
                self.spawn_api(async move { ApiEvent::RoomCreated(api.create_room(&request).await) });
            }
        }
    }

    // --- Keys ---

    fn handle_key(&mut self, key: KeyEvent) {
        // Global shortcuts first
        if key.modifiers == KeyModifiers::CONTROL
            && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c'))
        {
            self.running = false;
            return;
        }

        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Signup => self.handle_signup_key(key),
            Screen::Rooms => match self.overlay {
                Overlay::Help => {
                    if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
                        self.overlay = Overlay::None;
                    }
                }
                Overlay::ConfirmLogout => match key.code {
                    KeyCode::Char('y') | KeyCode::Enter => self.logout(),
                    KeyCode::Char('n') | KeyCode::Esc => self.overlay = Overlay::None,
                    _ => {}
                },
                Overlay::NewChat => self.handle_creator_key(key),
                Overlay::None => match self.focus {
                    Focus::Rooms => self.handle_rooms_key(key),
                    Focus::Chat => self.handle_chat_key(key),
                    Focus::Input => self.handle_input_key(key),
                },
            },
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        if self.login_busy {
            return;
        }

        match key.code {
            KeyCode::Tab | KeyCode::BackTab => {
                self.login_focus = (self.login_focus + 1) % 2;
            }
            KeyCode::Char('n') if key.modifiers == KeyModifiers::CONTROL => {
                self.screen = Screen::Signup;
                self.signup_focus = 0;
                self.signup_error = None;
            }
            KeyCode::Enter => {
                if self.login_focus == 1 || (!self.login_email.is_empty() && !self.login_password.is_empty()) {
                    self.submit_login();
                } else {
                    self.login_focus = 1;
                }
            }
            KeyCode::Char(c) => {
                let field = match self.login_focus {
                    0 => &mut self.login_email,
                    _ => &mut self.login_password,
                };
                field.push(c);
            }
            KeyCode::Backspace => {
                let field = match self.login_focus {
                    0 => &mut self.login_email,
                    _ => &mut self.login_password,
                };
                field.pop();
            }
            _ => {}
        }
    }

    fn submit_login(&mut self) {
        let email = self.login_email.trim().to_string();
        if email.is_empty() || self.login_password.is_empty() {
            self.login_error = Some("Email and password are required".to_string());
            return;
        }
        self.login_busy = true;
        self.login_error = None;
        let password = self.login_password.clone();
        let api = self.api.clone();
        self.spawn_api(async move { ApiEvent::Login(api.login(&email, &password).await) });
    }

    fn handle_signup_key(&mut self, key: KeyEvent) {
        if self.signup_busy {
            return;
        }
        let last = SIGNUP_FIELDS.len() - 1;

        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Login;
            }
            KeyCode::Tab => {
                self.signup_focus = (self.signup_focus + 1) % SIGNUP_FIELDS.len();
            }
            KeyCode::BackTab => {
                self.signup_focus = if self.signup_focus == 0 { last } else { self.signup_focus - 1 };
            }
            KeyCode::Enter => {
                if self.signup_focus == last || self.signup_fields.iter().all(|f| !f.is_empty()) {
                    self.submit_signup();
                } else {
                    self.signup_focus += 1;
                }
            }
            KeyCode::Char(c) => self.signup_fields[self.signup_focus].push(c),
            KeyCode::Backspace => {
                self.signup_fields[self.signup_focus].pop();
            }
            _ => {}
        }
    }

    fn submit_signup(&mut self) {
        let [first, last, email, password] = self.signup_fields.clone();
        let email = email.trim().to_string();
        if email.is_empty() || password.is_empty() {
            self.signup_error = Some("Email and password are required".to_string());
            return;
        }
        self.signup_busy = true;
        self.signup_error = None;
        let api = self.api.clone();
        self.spawn_api(async move {
            let request = SignupRequest {
                firstname: first.trim(),
                lastname: last.trim(),
                email: &email,
                password: &password,
            };
            let result = api.signup(&request).await;
            ApiEvent::Signup { email, result }
        });
    }

    fn handle_rooms_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => {
                self.selected_room = self.selected_room.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected_room + 1 < self.rooms.visible().len() {
                    self.selected_room += 1;
                }
                self.maybe_load_more();
            }
            KeyCode::End => {
                self.selected_room = self.rooms.visible().len().saturating_sub(1);
                self.maybe_load_more();
            }
            KeyCode::Enter => {
                if let Some(room) = self.rooms.visible().get(self.selected_room).cloned() {
                    self.open_room(room);
                }
            }
            KeyCode::Char('1') => self.select_tab(Tab::All),
            KeyCode::Char('2') => self.select_tab(Tab::Direct),
            KeyCode::Char('3') => self.select_tab(Tab::Group),
            KeyCode::Char(']') => self.select_tab(self.rooms.active_tab().next()),
            KeyCode::Char('[') => self.select_tab(self.rooms.active_tab().prev()),
            KeyCode::Char('r') => {
                let ticket = self.rooms.invalidate_active();
                self.request_rooms(ticket);
            }
            KeyCode::Char('n') => self.open_creator(),
            KeyCode::Char('L') => self.overlay = Overlay::ConfirmLogout,
            KeyCode::Char('?') => self.overlay = Overlay::Help,
            KeyCode::Tab | KeyCode::Right => {
                if self.pane.room().is_some() {
                    self.focus = Focus::Chat;
                }
            }
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.pane.scroll_up(),
            KeyCode::Down => self.pane.scroll_down(),
            KeyCode::Enter | KeyCode::Tab => self.focus = Focus::Input,
            KeyCode::BackTab | KeyCode::Left | KeyCode::Esc => self.focus = Focus::Rooms,
            KeyCode::Char('?') => self.overlay = Overlay::Help,
            _ => {}
        }
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let char_count = self.input.chars().count();
        match key.code {
            KeyCode::Enter => self.send_current_message(),
            KeyCode::Char(c) => {
                let idx = self.byte_index();
                self.input.insert(idx, c);
                self.cursor_pos += 1;
            }
            KeyCode::Backspace => {
                if self.cursor_pos > 0 {
                    self.cursor_pos -= 1;
                    let idx = self.byte_index();
                    self.input.remove(idx);
                }
            }
            KeyCode::Delete => {
                if self.cursor_pos < char_count {
                    let idx = self.byte_index();
                    self.input.remove(idx);
                }
            }
            KeyCode::Left => {
                self.cursor_pos = self.cursor_pos.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.cursor_pos < char_count {
                    self.cursor_pos += 1;
                }
            }
            KeyCode::Home => self.cursor_pos = 0,
            KeyCode::End => self.cursor_pos = char_count,
            KeyCode::Esc => self.focus = Focus::Chat,
            KeyCode::Tab => self.focus = Focus::Rooms,
            _ => {}
        }
    }

    fn handle_creator_key(&mut self, key: KeyEvent) {
        let Some(creator) = self.creator.as_mut() else {
            self.overlay = Overlay::None;
            return;
        };

        match (creator.focus, key.code) {
            (_, KeyCode::Esc) => {
                self.creator = None;
                self.overlay = Overlay::None;
            }
            (_, KeyCode::Tab) => creator.cycle_focus(),
            (CreatorFocus::Search, KeyCode::Enter | KeyCode::Down) => {
                creator.focus = CreatorFocus::Users;
            }
            (CreatorFocus::Search, KeyCode::Char(c)) => {
                creator.query.push(c);
                self.request_user_search();
            }
            (CreatorFocus::Search, KeyCode::Backspace) => {
                creator.query.pop();
                self.request_user_search();
            }
            (CreatorFocus::Users, KeyCode::Up) => creator.cursor_up(),
            (CreatorFocus::Users, KeyCode::Down) => creator.cursor_down(),
            (CreatorFocus::Users, KeyCode::Char(' ')) => creator.toggle_at_cursor(),
            (CreatorFocus::Users, KeyCode::Char('/')) => creator.focus = CreatorFocus::Search,
            (CreatorFocus::GroupName, KeyCode::Char(c)) => creator.group_name.push(c),
            (CreatorFocus::GroupName, KeyCode::Backspace) => {
                creator.group_name.pop();
            }
            (CreatorFocus::Users | CreatorFocus::GroupName, KeyCode::Enter) => self.create_room(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserSummary;
    use crate::session::StoredSession;

    fn user() -> UserSummary {
        UserSummary {
            id: "u1".into(),
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            email: "a@b.com".into(),
            avatar_url: None,
        }
    }

    fn test_app(dir: &tempfile::TempDir) -> (App, SessionStore) {
        let store = SessionStore::new(dir.path().join("session.json"));
        let config = Config {
            api_url: "http://127.0.0.1:9".into(),
            ..Config::default()
        };
        let app = App::new(config, store.clone(), ui::theme_by_name("")).unwrap();
        (app, store)
    }

    async fn wait_for_timer(
        rx: &mut mpsc::UnboundedReceiver<AppEvent>,
        wanted: TimerEvent,
    ) -> AppEvent {
        loop {
            match rx.recv().await {
                Some(AppEvent::Timer(ev)) if ev == wanted => return AppEvent::Timer(ev),
                Some(_) => continue,
                None => panic!("channel closed before {:?}", wanted),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn login_success_persists_token_and_enters_rooms_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, store) = test_app(&dir);
        let mut rx = app.rx.take().unwrap();
        app.start();
        assert_eq!(app.screen, Screen::Login);

        let started = tokio::time::Instant::now();
        app.handle_event(AppEvent::Api(ApiEvent::Login(Ok(LoginResponse {
            success: true,
            token: Some("T".into()),
            user: Some(user()),
            message: None,
        }))));

        assert_eq!(store.load().unwrap().unwrap().token, "T");
        assert_eq!(app.screen, Screen::Login);
        assert_eq!(app.notice.as_ref().unwrap().kind, NoticeKind::Success);

        let event = wait_for_timer(&mut rx, TimerEvent::EnterRooms).await;
        assert!(started.elapsed() >= LOGIN_REDIRECT_DELAY);
        app.handle_event(event);
        assert_eq!(app.screen, Screen::Rooms);
        assert!(app.rooms.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_login_stays_on_form() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, store) = test_app(&dir);
        app.start();
        app.handle_event(AppEvent::Api(ApiEvent::Login(Ok(LoginResponse {
            success: false,
            message: Some("Wrong password".into()),
            ..Default::default()
        }))));
        assert_eq!(app.login_error.as_deref(), Some("Wrong password"));
        assert!(store.load().unwrap().is_none());
        assert_eq!(app.screen, Screen::Login);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_clears_session_and_redirects_after_two_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, store) = test_app(&dir);
        store
            .save(&StoredSession {
                token: "T".into(),
                user: Some(user()),
            })
            .unwrap();
        let mut rx = app.rx.take().unwrap();
        app.start();
        assert_eq!(app.screen, Screen::Rooms);

        let started = tokio::time::Instant::now();
        app.handle_event(AppEvent::Unauthorized);
        app.handle_event(AppEvent::Unauthorized);

        assert!(store.load().unwrap().is_none());
        let notice = app.notice.as_ref().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.text, "Session expired, please login again");
        assert_eq!(app.screen, Screen::Rooms);

        let event = wait_for_timer(&mut rx, TimerEvent::SessionRedirect).await;
        assert!(started.elapsed() >= SESSION_REDIRECT_DELAY);
        app.handle_event(event);
        assert_eq!(app.screen, Screen::Login);
        assert!(app.rooms.visible().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reusing_direct_room_sends_no_create_request() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, store) = test_app(&dir);
        store
            .save(&StoredSession {
                token: "T".into(),
                user: Some(user()),
            })
            .unwrap();
        app.start();

        let ticket = app.rooms.select_tab(Tab::Direct).unwrap();
        let existing: RoomSummary = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "name": "Bob",
            "isGroup": false,
            "members": [{"id": "u1"}, {"id": "u2", "firstname": "Bob"}],
        }))
        .unwrap();
        app.rooms.apply_page(
            ticket,
            crate::api::RoomPage {
                rooms: vec![existing],
                total_pages: 1,
            },
        );

        app.open_creator();
        let bob = UserSummary {
            id: "u2".into(),
            firstname: "Bob".into(),
            lastname: String::new(),
            email: "bob@example.com".into(),
            avatar_url: None,
        };
        app.creator.as_mut().unwrap().toggle(&bob);
        app.create_room();

        assert!(app.creator.is_none());
        assert_eq!(app.overlay, Overlay::None);
        assert_eq!(app.pane.room_id(), Some("r1"));
    }

    fn room(id: &str, is_group: bool) -> RoomSummary {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("room {}", id),
            "isGroup": is_group,
            "members": [{"id": "u1"}, {"id": "u2"}],
        }))
        .unwrap()
    }

    fn sent(id: &str, content: &str) -> crate::model::Message {
        crate::model::Message {
            id: id.into(),
            room_id: "r1".into(),
            sender_id: "u1".into(),
            content: content.into(),
            created_at: chrono::Utc::now(),
            delivered_to: vec!["u2".into()],
            seen_by: Vec::new(),
        }
    }

    /// Signed-in app with r1 cached in the All and Direct tabs and All active
    fn signed_in_with_rooms(dir: &tempfile::TempDir) -> App {
        let (mut app, store) = test_app(dir);
        store
            .save(&StoredSession {
                token: "T".into(),
                user: Some(user()),
            })
            .unwrap();
        app.start();
        for (tab, rooms) in [
            (Tab::Direct, vec![room("r1", false)]),
            (Tab::All, vec![room("r1", false), room("g1", true)]),
        ] {
            let ticket = app.rooms.select_tab(tab).unwrap();
            assert!(app.rooms.apply_page(
                ticket,
                crate::api::RoomPage {
                    rooms,
                    total_pages: 1,
                },
            ));
        }
        app
    }

    #[tokio::test(start_paused = true)]
    async fn sends_patch_every_tab_and_refresh_active_tab_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = signed_in_with_rooms(&dir);
        let mut rx = app.rx.take().unwrap();
        app.open_room(room("r1", false));

        let first = app.pane.send("one", "u1").unwrap();
        app.handle_event(AppEvent::Api(ApiEvent::Sent {
            ticket: first,
            result: Ok(sent("m1", "one")),
        }));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = app.pane.send("two", "u1").unwrap();
        app.handle_event(AppEvent::Api(ApiEvent::Sent {
            ticket: second,
            result: Ok(sent("m2", "two")),
        }));
        let last_send = tokio::time::Instant::now();

        for rooms in [app.rooms.visible(), app.rooms.cached(Tab::All), app.rooms.cached(Tab::Direct)] {
            let r1 = rooms.iter().find(|r| r.id == "r1").unwrap();
            assert_eq!(r1.last_message.as_deref(), Some("two"));
        }
        assert!(!app.rooms.is_fetching());

        let event = wait_for_timer(&mut rx, TimerEvent::RefreshRooms).await;
        assert!(last_send.elapsed() >= REFRESH_DEBOUNCE);
        app.handle_event(event);

        assert!(app.rooms.cached(Tab::All).is_empty());
        assert_eq!(app.rooms.cached(Tab::Direct).len(), 1);
        let ticket = app.rooms.in_flight().unwrap();
        assert_eq!(ticket.tab, Tab::All);
        assert_eq!(ticket.page, 1);
        assert!(ticket.reset);

        // The burst armed a single refresh
        tokio::time::sleep(REFRESH_DEBOUNCE * 2).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, AppEvent::Timer(TimerEvent::RefreshRooms)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn created_room_resets_caches_and_opens() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = signed_in_with_rooms(&dir);
        app.open_creator();

        app.handle_event(AppEvent::Api(ApiEvent::RoomCreated(Ok(room("n1", true)))));

        assert_eq!(app.overlay, Overlay::None);
        assert!(app.creator.is_none());
        for tab in Tab::ALL {
            assert!(app.rooms.cached(tab).is_empty());
        }
        assert_eq!(app.rooms.visible()[0].id, "n1");
        assert_eq!(app.selected_room, 0);
        assert_eq!(app.pane.room_id(), Some("n1"));
        assert_eq!(app.notice.as_ref().unwrap().text, "Room created!");
        let ticket = app.rooms.in_flight().unwrap();
        assert_eq!((ticket.tab, ticket.page, ticket.reset), (Tab::All, 1, true));
    }

    #[tokio::test(start_paused = true)]
    async fn input_editing_handles_multibyte_chars() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(&dir);
        for c in "héllo".chars() {
            app.handle_input_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        app.handle_input_key(KeyEvent::new(KeyCode::Left, KeyModifiers::NONE));
        app.handle_input_key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE));
        assert_eq!(app.input, "hélo");
        assert_eq!(app.cursor_pos, 3);
    }
}

use crossterm::event::{self, Event, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::{ApiError, LoginResponse, RoomPage, SignupResponse};
use crate::creator::SearchTicket;
use crate::messages::{LoadTicket, SendTicket};
use crate::model::{Message, RoomSummary, UserSummary};
use crate::rooms::FetchTicket;

/// Results of backend calls, posted back to the event loop
#[derive(Debug)]
pub enum ApiEvent {
    Login(Result<LoginResponse, ApiError>),
    Signup {
        email: String,
        result: Result<SignupResponse, ApiError>,
    },
    Me(Result<UserSummary, ApiError>),
    RoomsPage {
        ticket: FetchTicket,
        result: Result<RoomPage, ApiError>,
    },
    History {
        ticket: LoadTicket,
        result: Result<Vec<Message>, ApiError>,
    },
    Sent {
        ticket: SendTicket,
        result: Result<Message, ApiError>,
    },
    Users {
        ticket: SearchTicket,
        result: Result<Vec<UserSummary>, ApiError>,
    },
    RoomCreated(Result<RoomSummary, ApiError>),
}

/// Delayed actions scheduled by the app itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Login succeeded and the notice has been visible long enough
    EnterRooms,
    /// Session expired; leave for the login screen
    SessionRedirect,
    /// Debounced hard refresh after sending
    RefreshRooms,
}

/// All events the app loop handles
#[derive(Debug)]
pub enum AppEvent {
    /// A key was pressed
    Key(KeyEvent),
    /// Terminal was resized
    Resize(u16, u16),
    Api(ApiEvent),
    Timer(TimerEvent),
    /// Some authenticated request came back 401
    Unauthorized,
    /// Tick for periodic UI refresh
    Tick,
}

/// Spawns a task that reads terminal events and forwards them
pub fn spawn_input_reader(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        loop {
            // Poll for crossterm events with a timeout (tick rate)
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.send(AppEvent::Key(key)).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Resize(w, h)) => {
                        let _ = tx.send(AppEvent::Resize(w, h));
                    }
                    _ => {}
                }
            } else if tx.send(AppEvent::Tick).is_err() {
                break;
            }
        }
    });
}

/// Spawns a bridge that turns 401 signals from the API client into AppEvents
pub fn spawn_unauthorized_bridge(
    mut unauthorized_rx: mpsc::UnboundedReceiver<()>,
    app_tx: mpsc::UnboundedSender<AppEvent>,
) {
    tokio::spawn(async move {
        while unauthorized_rx.recv().await.is_some() {
            if app_tx.send(AppEvent::Unauthorized).is_err() {
                break;
            }
        }
    });
}

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::alarm::ToneAlarm;
use crate::config::Config;
use crate::event::Event;
use crate::fleet::Fleet;
use crate::grid::Slot;
use crate::input::{self, Command};
use crate::log::AlertLogger;
use crate::notify::{Level, Notifier, NotificationBoard};
use crate::predefined;
use crate::render;
use crate::store::JsonFileStore;
use crate::transport::MjpegTransport;

/// How often notices are expired and the shutdown flag is checked
const HOUSEKEEPING_PERIOD: Duration = Duration::from_millis(250);

/// Helper macro to print status and flush stdout
macro_rules! status {
    ($($arg:tt)*) => {{
        print!($($arg)*);
        let _ = std::io::stdout().flush();
    }};
}

type ConsoleFleet = Fleet<JsonFileStore, MjpegTransport, NotificationBoard, ToneAlarm>;

pub struct App {
    pub fleet: ConsoleFleet,
    pub alert_log: Option<AlertLogger>,
    pub running: Arc<AtomicBool>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    last_slots: Vec<Slot>,
    last_active: usize,
}

impl App {
    pub fn new(config: &Config, running: Arc<AtomicBool>) -> Result<Self, Box<dyn std::error::Error>> {
        let server = config.server_url()?;
        let layout = config.layout()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let alarm = if config.alert.sound {
            status!("Opening audio output... ");
            let alarm = ToneAlarm::new(true);
            println!("{}", if alarm.is_audible() { "OK" } else { "FAILED (alerts will be silent)" });
            alarm
        } else {
            ToneAlarm::silent()
        };

        let store = JsonFileStore::new(config.storage_dir());
        println!("Camera list: {}", store.path().display());

        let transport = MjpegTransport::new(server.clone(), events_tx.clone());
        let mut fleet = Fleet::new(
            store,
            transport,
            NotificationBoard::new(),
            alarm,
            layout,
            events_tx.clone(),
        );

        let revision = fleet.bootstrap();
        status!("Requesting predefined cameras from {}... ", server);
        predefined::spawn_fetch(server, revision, events_tx);
        println!("sent");

        let alert_log = AlertLogger::new(config.logging.directory.as_deref());

        println!();
        println!("Ready. Type help for commands.");
        println!();

        Ok(Self {
            fleet,
            alert_log,
            running,
            events_rx,
            last_slots: Vec::new(),
            last_active: 0,
        })
    }

    /// Run until quit, Ctrl+C, or every event source is gone
    pub async fn run(&mut self) {
        let mut lines = input::stdin_lines();
        let mut stdin_open = true;
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_PERIOD);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.refresh(true);
        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                line = lines.next(), if stdin_open => match line {
                    Some(Ok(line)) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    Some(Err(e)) => warn!("Failed to read command: {}", e),
                    None => {
                        info!("stdin closed, running until interrupted");
                        stdin_open = false;
                    }
                },
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if let Some(alert) = self.fleet.handle_event(event) {
                            if let Some(log) = self.alert_log.as_mut() {
                                log.log_alert(&alert);
                            }
                        }
                        self.refresh(false);
                    }
                    None => break,
                },
                _ = housekeeping.tick() => {
                    self.fleet.notifier_mut().expire(Instant::now());
                }
            }
        }

        info!("shutting down");
        self.fleet.shutdown();
    }

    /// Apply one command line. Returns false when the operator asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        let command = match input::parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                self.fleet.notifier_mut().notify(Level::Error, e.to_string());
                self.refresh(false);
                return true;
            }
        };

        let mut out = std::io::stdout();
        let drawn = match command {
            Command::Add(definition) => {
                self.fleet.on_add(definition);
                Ok(())
            }
            Command::Toggle(id) => {
                self.fleet.on_toggle(id);
                Ok(())
            }
            Command::Delete(id) => {
                self.fleet.on_delete(id);
                Ok(())
            }
            Command::Maximize(id) => {
                self.fleet.on_maximize(id);
                Ok(())
            }
            Command::Layout(size) => {
                self.fleet.on_layout_change(size);
                Ok(())
            }
            Command::List => render::draw_cameras(&mut out, self.fleet.registry().list()),
            Command::Help => render::draw_help(&mut out),
            Command::Refresh => {
                // Force a grid redraw below; everything still visible is reprinted here
                self.last_slots.clear();
                self.fleet.notifier_mut().take_unseen();
                render::draw_notices(&mut out, self.fleet.notifier().visible())
            }
            Command::Quit => return false,
        };
        if let Err(e) = drawn {
            warn!("Failed to draw: {}", e);
        }
        self.refresh(false);
        true
    }

    /// Redraw the grid if it changed (or `force`), then print new notices
    fn refresh(&mut self, force: bool) {
        let mut out = std::io::stdout();
        let slots = self.fleet.slots();
        let active = self.fleet.registry().list().iter().filter(|c| c.is_active()).count();
        if force || slots != self.last_slots || active != self.last_active {
            if let Err(e) = render::draw_grid(&mut out, &slots, self.fleet.layout(), active) {
                warn!("Failed to draw grid: {}", e);
            }
            self.last_slots = slots;
            self.last_active = active;
        }
        let unseen = self.fleet.notifier_mut().take_unseen();
        if let Err(e) = render::draw_notices(&mut out, unseen.iter()) {
            warn!("Failed to draw notices: {}", e);
        }
    }
}

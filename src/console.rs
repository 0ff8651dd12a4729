use crate::decoder::SimulatedDecoderService;
use crate::error::{Result, ScanError};
use crate::events::{EventReceiver, SessionEvent};
use crate::lifecycle::{LifecycleSignal, PermissionQuery, SimulatedPermissions};
use crate::session::{SessionInput, SessionSnapshot};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HELP: &str = "\
Type a ticket code and press enter to present it to the camera.
Commands:
  :start :stop :retry :reset     session control
  :hide :show :blur :focus       page visibility and focus
  :restored                      page restored from cache
  :grant :deny                   camera permission changed in settings
  :kill                          camera track dies silently
  :miss                          frame with no code in it
  :tap                           operator tapped the screen
  :status                        print the session snapshot
  :help :quit";

/// One line of operator input
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Session(SessionInput),
    Present(String),
    Permission(PermissionQuery),
    KillStreams,
    Miss,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }

    let Some(command) = line.strip_prefix(':') else {
        return ConsoleCommand::Present(line.to_string());
    };

    match command.trim().to_ascii_lowercase().as_str() {
        "start" => ConsoleCommand::Session(SessionInput::Start),
        "stop" => ConsoleCommand::Session(SessionInput::Stop),
        "retry" => ConsoleCommand::Session(SessionInput::Retry),
        "reset" => ConsoleCommand::Session(SessionInput::Reset),
        "tap" => ConsoleCommand::Session(SessionInput::UserInteraction),
        "grant" => ConsoleCommand::Permission(PermissionQuery::Granted),
        "deny" => ConsoleCommand::Permission(PermissionQuery::Denied),
        "kill" => ConsoleCommand::KillStreams,
        "miss" => ConsoleCommand::Miss,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => match other.parse::<LifecycleSignal>() {
            Ok(signal) => ConsoleCommand::Session(SessionInput::Lifecycle(signal)),
            Err(_) => ConsoleCommand::Unknown(other.to_string()),
        },
    }
}

/// Drives a session from stdin lines against the simulated camera
pub struct OperatorConsole {
    inputs: mpsc::Sender<SessionInput>,
    decoder: Arc<SimulatedDecoderService>,
    permissions: Arc<SimulatedPermissions>,
    snapshots: watch::Receiver<SessionSnapshot>,
    cancellation_token: CancellationToken,
}

impl OperatorConsole {
    pub fn new(
        inputs: mpsc::Sender<SessionInput>,
        decoder: Arc<SimulatedDecoderService>,
        permissions: Arc<SimulatedPermissions>,
        snapshots: watch::Receiver<SessionSnapshot>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            inputs,
            decoder,
            permissions,
            snapshots,
            cancellation_token,
        }
    }

    /// Read commands until quit, end of input or cancellation
    pub async fn run<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Operator console ready, :help lists commands");
        let mut lines = reader.lines();

        loop {
            let line = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                debug!("Console input closed");
                break;
            };

            if !self.execute(parse_line(&line)).await? {
                break;
            }
        }

        self.cancellation_token.cancel();
        Ok(())
    }

    /// Apply one command; returns false when the console should exit
    pub async fn execute(&self, command: ConsoleCommand) -> Result<bool> {
        match command {
            ConsoleCommand::Session(input) => self.send(input).await?,
            ConsoleCommand::Present(code) => {
                if !self.decoder.present_code(&code) {
                    println!("No live camera to present '{}' to", code);
                }
            }
            ConsoleCommand::Permission(query) => {
                self.permissions.set_query(query);
                self.send(SessionInput::PermissionChanged(query)).await?;
            }
            ConsoleCommand::KillStreams => {
                warn!("Killing camera tracks");
                self.decoder.kill_streams();
            }
            ConsoleCommand::Miss => {
                self.decoder.present_miss();
            }
            ConsoleCommand::Status => println!("{}", format_snapshot(&self.snapshots.borrow())),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => return Ok(false),
            ConsoleCommand::Empty => {}
            ConsoleCommand::Unknown(command) => {
                println!("Unknown command ':{}' (try :help)", command)
            }
        }
        Ok(true)
    }

    async fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| ScanError::system("Session is no longer running"))
    }
}

/// Prints session events to stdout
pub struct EventPrinter {
    receiver: EventReceiver,
    json: bool,
}

impl EventPrinter {
    pub fn new(receiver: EventReceiver, json: bool) -> Self {
        Self { receiver, json }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                event = self.receiver.recv() => event,
            };

            match event {
                Ok(event) => println!("{}", format_event(&event, self.json)),
                Err(e) => {
                    debug!("Event printer stopping: {}", e);
                    break;
                }
            }
        }
    }
}

pub fn format_event(event: &SessionEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_else(|e| {
            format!("{{\"event\":\"unserializable\",\"error\":\"{}\"}}", e)
        });
    }

    let time = event.timestamp().format("%H:%M:%S%.3f");
    match event {
        SessionEvent::StateChanged {
            to: crate::session::SessionState::Failed(reason),
            ..
        } => format!(
            "[{}] {}\n           {}",
            time,
            event.description(),
            reason.remediation()
        ),
        _ => format!("[{}] {}", time, event.description()),
    }
}

pub fn format_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = format!(
        "session {}\n  state: {}\n  permission: {:?}\n  camera: {}\n",
        snapshot.session_id,
        snapshot.state,
        snapshot.permission,
        snapshot
            .camera
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );

    if let Some(hint) = &snapshot.remediation {
        out.push_str(&format!("  hint: {}\n", hint));
    }

    match &snapshot.displayed {
        Some(shown) => out.push_str(&format!(
            "  showing: {:?} {}\n",
            shown.outcome.class(),
            shown.outcome.code()
        )),
        None => out.push_str("  showing: ready to scan\n"),
    }

    out.push_str(&format!(
        "  accepted {} / duplicate {} / suppressed {}\n  history:",
        snapshot.stats.accepted, snapshot.stats.duplicate, snapshot.stats.suppressed
    ));
    if snapshot.history.is_empty() {
        out.push_str(" (empty)");
    }
    for entry in &snapshot.history {
        out.push_str(&format!(
            "\n    {} {:?} {}",
            entry.at.format("%H:%M:%S"),
            entry.class,
            entry.code
        ));
    }
    out
}

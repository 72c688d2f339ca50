// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Space e-stop, [/] trim, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use mecanum_rover_runtime::config::{TOPIC_CMD_BASE, TOPIC_CMD_ESTOP, TOPIC_CMD_TRIM};
use mecanum_rover_runtime::messages::{BaseCommand, EstopCommand, TrimCommand};

const SPEEDS: [f32; 3] = [0.1, 0.3, 0.6]; // m/s
const ANGULAR_SPEEDS: [f32; 3] = [0.3, 0.8, 1.5]; // rad/s
const SPEED_LABELS: [&str; 3] = ["LOW", "MED", "HIGH"];
const TRIM_STEP: f32 = 0.01;
const INPUT_TIMEOUT: Duration = Duration::from_millis(100); // Zero velocity after this long with no movement key
const POLL_INTERVAL: Duration = Duration::from_millis(20); // ~50Hz publish rate

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Side effect requested by a key press, beyond updating the velocity
#[derive(Debug, PartialEq)]
enum Action {
    None,
    Estop(bool),
    Trim(f32),
    Quit,
}

/// Keyboard state: current speed step, held velocity, e-stop toggle
struct Teleop {
    speed_idx: usize,
    estop: bool,
    cmd: BaseCommand,
    last_movement: Instant,
}

impl Teleop {
    fn new(now: Instant) -> Self {
        Self {
            speed_idx: 0,
            estop: false,
            cmd: BaseCommand {
                linear: 0.0,
                angular: 0.0,
                translational: 0.0,
            },
            last_movement: now,
        }
    }

    fn handle_key(&mut self, code: KeyCode, kind: KeyEventKind, now: Instant) -> Action {
        let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
        if !pressed {
            return Action::None;
        }
        let speed = SPEEDS[self.speed_idx];
        let angular = ANGULAR_SPEEDS[self.speed_idx];

        match code {
            KeyCode::Char('w') => self.drive(|c| c.linear = speed, now),
            KeyCode::Char('s') => self.drive(|c| c.linear = -speed, now),
            KeyCode::Char('a') => self.drive(|c| c.translational = speed, now),
            KeyCode::Char('d') => self.drive(|c| c.translational = -speed, now),
            KeyCode::Char('z') => self.drive(|c| c.angular = angular, now),
            KeyCode::Char('x') => self.drive(|c| c.angular = -angular, now),
            KeyCode::Char('r') => {
                self.speed_idx = (self.speed_idx + 1).min(SPEEDS.len() - 1);
                info!("Speed: {}", SPEED_LABELS[self.speed_idx]);
            }
            KeyCode::Char('f') => {
                self.speed_idx = self.speed_idx.saturating_sub(1);
                info!("Speed: {}", SPEED_LABELS[self.speed_idx]);
            }
            // Toggle on press only, key repeat would flap it
            KeyCode::Char(' ') if kind == KeyEventKind::Press => {
                self.estop = !self.estop;
                return Action::Estop(self.estop);
            }
            KeyCode::Char('[') => return Action::Trim(-TRIM_STEP),
            KeyCode::Char(']') => return Action::Trim(TRIM_STEP),
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            _ => {}
        }
        Action::None
    }

    fn drive(&mut self, update: impl FnOnce(&mut BaseCommand), now: Instant) {
        update(&mut self.cmd);
        self.last_movement = now;
    }

    /// Command to publish this cycle; zero once movement keys are released
    fn command(&mut self, now: Instant) -> BaseCommand {
        if now.duration_since(self.last_movement) > INPUT_TIMEOUT {
            self.cmd = BaseCommand {
                linear: 0.0,
                angular: 0.0,
                translational: 0.0,
            };
        }
        self.cmd
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_base = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let pub_estop = session.declare_publisher(TOPIC_CMD_ESTOP).await?;
    let pub_trim = session.declare_publisher(TOPIC_CMD_TRIM).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Space=e-stop, [/]=trim, Q=quit");
    info!("Speed: {}", SPEED_LABELS[0]);

    enable_raw_mode()?;
    let result = run_teleop(&pub_base, &pub_estop, &pub_trim).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_base: &zenoh::pubsub::Publisher<'_>,
    pub_estop: &zenoh::pubsub::Publisher<'_>,
    pub_trim: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), BoxError> {
    let mut teleop = Teleop::new(Instant::now());

    loop {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                match teleop.handle_key(code, kind, Instant::now()) {
                    Action::None => {}
                    Action::Estop(estop) => {
                        info!("E-stop: {}", if estop { "ON" } else { "OFF" });
                        pub_estop
                            .put(serde_json::to_string(&EstopCommand { estop })?)
                            .await?;
                    }
                    Action::Trim(delta) => {
                        info!("Trim {:+}", delta);
                        pub_trim
                            .put(serde_json::to_string(&TrimCommand { delta })?)
                            .await?;
                    }
                    Action::Quit => break,
                }
            }
        }

        // Publish every cycle so the runtime never sees a stale command while a key is held
        let cmd = teleop.command(Instant::now());
        pub_base.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

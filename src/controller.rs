// Operator input sources for the teleop loop
//
// Provides:
// - The Controller interface (sticks, triggers, buttons)
// - A scripted controller that replays timed readings
// - A keyboard controller for bench driving from a terminal

use std::collections::HashSet;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use tokio::time::Instant;

/// Gamepad buttons the drive stack reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Up,
    Down,
    Left,
    Right,
    Lb,
    Rb,
    Guide,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("No readings available for {0}")]
    NoReadings(&'static str),

    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Latest sampled controller state
///
/// Stick axes and triggers are in [-100, 100] and [0, 100] respectively.
pub trait Controller {
    fn joystick_left(&mut self) -> Result<(f64, f64)>;
    fn joystick_right(&mut self) -> Result<(f64, f64)>;
    /// (left, right)
    fn triggers(&mut self) -> Result<(f64, f64)>;
    fn pressed_buttons(&mut self) -> Result<HashSet<Button>>;
}

/// A value that holds for `duration`
#[derive(Debug, Clone)]
pub struct Reading<T> {
    pub value: T,
    pub duration: Duration,
}

impl<T> Reading<T> {
    pub fn new(value: T, duration: Duration) -> Self {
        Self { value, duration }
    }

    pub fn millis(value: T, millis: u64) -> Self {
        Self::new(value, Duration::from_millis(millis))
    }
}

/// Sequence of readings played back against the tokio clock
///
/// After the last reading expires its value keeps being reported.
#[derive(Debug, Clone)]
pub struct ReadingsTimeline<T> {
    readings: Vec<Reading<T>>,
    started: Instant,
}

impl<T: Clone> ReadingsTimeline<T> {
    pub fn new(readings: Vec<Reading<T>>) -> Self {
        Self {
            readings,
            started: Instant::now(),
        }
    }

    pub fn value_at(&self, elapsed: Duration) -> Option<T> {
        let mut total = Duration::ZERO;
        for reading in &self.readings {
            total += reading.duration;
            if elapsed < total {
                return Some(reading.value.clone());
            }
        }
        self.readings.last().map(|r| r.value.clone())
    }

    pub fn current(&self) -> Option<T> {
        self.value_at(self.started.elapsed())
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Controller replaying scripted readings, used for demos and tests
#[derive(Debug, Clone)]
pub struct ScriptedController {
    joystick_left: ReadingsTimeline<(f64, f64)>,
    joystick_right: ReadingsTimeline<(f64, f64)>,
    triggers: ReadingsTimeline<(f64, f64)>,
    buttons: ReadingsTimeline<Vec<Button>>,
}

impl Default for ScriptedController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedController {
    pub fn new() -> Self {
        Self {
            joystick_left: ReadingsTimeline::new(Vec::new()),
            joystick_right: ReadingsTimeline::new(Vec::new()),
            triggers: ReadingsTimeline::new(Vec::new()),
            buttons: ReadingsTimeline::new(Vec::new()),
        }
    }

    pub fn with_joystick_left(mut self, readings: Vec<Reading<(f64, f64)>>) -> Self {
        self.joystick_left = ReadingsTimeline::new(readings);
        self
    }

    pub fn with_joystick_right(mut self, readings: Vec<Reading<(f64, f64)>>) -> Self {
        self.joystick_right = ReadingsTimeline::new(readings);
        self
    }

    pub fn with_triggers(mut self, readings: Vec<Reading<(f64, f64)>>) -> Self {
        self.triggers = ReadingsTimeline::new(readings);
        self
    }

    pub fn with_buttons(mut self, readings: Vec<Reading<Vec<Button>>>) -> Self {
        self.buttons = ReadingsTimeline::new(readings);
        self
    }

    /// Swerve demo: left stick only, Guide once the script has played out
    fn demo(left: Vec<Reading<(f64, f64)>>) -> Self {
        let length = left.iter().map(|r| r.duration).sum::<Duration>();
        Self::new()
            .with_joystick_left(left)
            .with_joystick_right(vec![Reading::new((0.0, 0.0), length)])
            .with_buttons(vec![
                Reading::new(Vec::new(), length),
                Reading::millis(vec![Button::Guide], 0),
            ])
    }

    /// Ramp forward on the left stick, then release
    pub fn straight_line() -> Self {
        Self::demo(vec![
            Reading::millis((0.0, 50.0), 1000),
            Reading::millis((0.0, 75.0), 1000),
            Reading::millis((0.0, 100.0), 1000),
            Reading::millis((0.0, 75.0), 1000),
            Reading::millis((0.0, 50.0), 1000),
            Reading::millis((0.0, 0.0), 1000),
        ])
    }

    pub fn zig_zag() -> Self {
        Self::demo(vec![
            Reading::millis((50.0, 50.0), 1000),
            Reading::millis((0.0, 75.0), 1000),
            Reading::millis((-75.0, 75.0), 1000),
            Reading::millis((0.0, 100.0), 1000),
            Reading::millis((100.0, 100.0), 1000),
            Reading::millis((0.0, 0.0), 1000),
        ])
    }
}

impl Controller for ScriptedController {
    fn joystick_left(&mut self) -> Result<(f64, f64)> {
        self.joystick_left
            .current()
            .ok_or(ControllerError::NoReadings("left joystick"))
    }

    fn joystick_right(&mut self) -> Result<(f64, f64)> {
        self.joystick_right
            .current()
            .ok_or(ControllerError::NoReadings("right joystick"))
    }

    fn triggers(&mut self) -> Result<(f64, f64)> {
        self.triggers
            .current()
            .ok_or(ControllerError::NoReadings("triggers"))
    }

    fn pressed_buttons(&mut self) -> Result<HashSet<Button>> {
        self.buttons
            .current()
            .map(|buttons| buttons.into_iter().collect())
            .ok_or(ControllerError::NoReadings("buttons"))
    }
}

// Sticks and triggers fall back to neutral after this long without a key
const KEY_HOLD_TIMEOUT: Duration = Duration::from_millis(150);

/// Terminal keyboard mapped onto a gamepad
///
/// WASD = left stick, IJKL = right stick, Q/E = left/right trigger,
/// arrows = d-pad, 1-4 = A/B/X/Y, space = RB (brake), Esc = Guide (exit).
/// The terminal must be in raw mode.
pub struct KeyboardController {
    left: (f64, f64),
    right: (f64, f64),
    triggers: (f64, f64),
    pending: HashSet<Button>,
    last_axis_input: Instant,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardController {
    pub fn new() -> Self {
        Self {
            left: (0.0, 0.0),
            right: (0.0, 0.0),
            triggers: (0.0, 0.0),
            pending: HashSet::new(),
            last_axis_input: Instant::now(),
        }
    }

    /// Drain pending terminal events into the sampled state
    fn poll(&mut self) -> Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Press || kind == KeyEventKind::Repeat {
                    self.on_key(code);
                }
            }
        }

        if self.last_axis_input.elapsed() > KEY_HOLD_TIMEOUT {
            self.left = (0.0, 0.0);
            self.right = (0.0, 0.0);
            self.triggers = (0.0, 0.0);
        }
        Ok(())
    }

    fn on_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('w') => self.left.1 = 100.0,
            KeyCode::Char('s') => self.left.1 = -100.0,
            KeyCode::Char('a') => self.left.0 = -100.0,
            KeyCode::Char('d') => self.left.0 = 100.0,
            KeyCode::Char('i') => self.right.1 = 100.0,
            KeyCode::Char('k') => self.right.1 = -100.0,
            KeyCode::Char('j') => self.right.0 = -100.0,
            KeyCode::Char('l') => self.right.0 = 100.0,
            KeyCode::Char('q') => self.triggers.0 = 100.0,
            KeyCode::Char('e') => self.triggers.1 = 100.0,
            other => {
                if let Some(button) = key_button(other) {
                    self.pending.insert(button);
                }
                return;
            }
        }
        self.last_axis_input = Instant::now();
    }
}

fn key_button(code: KeyCode) -> Option<Button> {
    let button = match code {
        KeyCode::Up => Button::Up,
        KeyCode::Down => Button::Down,
        KeyCode::Left => Button::Left,
        KeyCode::Right => Button::Right,
        KeyCode::Char('1') => Button::A,
        KeyCode::Char('2') => Button::B,
        KeyCode::Char('3') => Button::X,
        KeyCode::Char('4') => Button::Y,
        KeyCode::Char(' ') => Button::Rb,
        KeyCode::Esc => Button::Guide,
        _ => return None,
    };
    Some(button)
}

impl Controller for KeyboardController {
    fn joystick_left(&mut self) -> Result<(f64, f64)> {
        self.poll()?;
        Ok(self.left)
    }

    fn joystick_right(&mut self) -> Result<(f64, f64)> {
        self.poll()?;
        Ok(self.right)
    }

    fn triggers(&mut self) -> Result<(f64, f64)> {
        self.poll()?;
        Ok(self.triggers)
    }

    /// Buttons pressed since the previous call
    fn pressed_buttons(&mut self) -> Result<HashSet<Button>> {
        self.poll()?;
        Ok(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_steps_through_readings() {
        let timeline = ReadingsTimeline::new(vec![
            Reading::millis(1, 1000),
            Reading::millis(2, 500),
            Reading::millis(3, 0),
        ]);
        assert_eq!(timeline.value_at(Duration::from_millis(0)), Some(1));
        assert_eq!(timeline.value_at(Duration::from_millis(999)), Some(1));
        assert_eq!(timeline.value_at(Duration::from_millis(1000)), Some(2));
        // Last reading persists
        assert_eq!(timeline.value_at(Duration::from_secs(60)), Some(3));
    }

    #[test]
    fn test_empty_timeline_is_an_error() {
        let mut controller = ScriptedController::straight_line();
        assert!(controller.joystick_left().is_ok());
        assert!(matches!(
            controller.triggers(),
            Err(ControllerError::NoReadings("triggers"))
        ));
    }

    #[test]
    fn test_scripted_buttons() {
        let mut controller = ScriptedController::new().with_buttons(vec![Reading::millis(
            vec![Button::A, Button::Up],
            10_000,
        )]);
        let pressed = controller.pressed_buttons().unwrap();
        assert!(pressed.contains(&Button::A));
        assert!(pressed.contains(&Button::Up));
        assert!(!pressed.contains(&Button::B));
    }

    #[test]
    fn test_keyboard_mapping() {
        let mut keyboard = KeyboardController::new();
        keyboard.on_key(KeyCode::Char('w'));
        keyboard.on_key(KeyCode::Char('l'));
        keyboard.on_key(KeyCode::Char('2'));
        keyboard.on_key(KeyCode::Char('z'));
        assert_eq!(keyboard.left, (0.0, 100.0));
        assert_eq!(keyboard.right, (100.0, 0.0));
        assert_eq!(keyboard.pending, HashSet::from([Button::B]));
    }
}

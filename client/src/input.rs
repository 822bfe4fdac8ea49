//! Keyboard handling for movement and chat entry

use macroquad::prelude::*;
use shared::Position;

/// World units per second.
const MOVE_SPEED: f32 = 220.0;
const MAX_DRAFT_CHARS: usize = 64;

/// What the user asked for this frame.
#[derive(Debug, Default)]
pub struct FrameInput {
    pub chat_to_send: Option<String>,
}

pub struct InputManager {
    position: Position,
    bounds: (f32, f32),
    /// Chat line being typed, `None` when not typing.
    draft: Option<String>,
}

impl InputManager {
    pub fn new(start: Position, bounds: (f32, f32)) -> Self {
        Self {
            position: start,
            bounds,
            draft: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn update(&mut self, dt: f32) -> FrameInput {
        let mut frame = FrameInput::default();

        match self.draft.as_mut() {
            Some(draft) => {
                while let Some(c) = get_char_pressed() {
                    if !c.is_control() && draft.chars().count() < MAX_DRAFT_CHARS {
                        draft.push(c);
                    }
                }
                if is_key_pressed(KeyCode::Backspace) {
                    draft.pop();
                }
                if is_key_pressed(KeyCode::Enter) {
                    let text = draft.trim().to_string();
                    if !text.is_empty() {
                        frame.chat_to_send = Some(text);
                    }
                    self.draft = None;
                } else if is_key_pressed(KeyCode::Escape) {
                    self.draft = None;
                }
            }
            None => {
                if is_key_pressed(KeyCode::Enter) {
                    // drop the keys that were queued while moving
                    while get_char_pressed().is_some() {}
                    self.draft = Some(String::new());
                } else {
                    self.apply_movement(dt);
                }
            }
        }

        frame
    }

    fn apply_movement(&mut self, dt: f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if is_key_down(KeyCode::A) || is_key_down(KeyCode::Left) {
            dx -= 1.0;
        }
        if is_key_down(KeyCode::D) || is_key_down(KeyCode::Right) {
            dx += 1.0;
        }
        if is_key_down(KeyCode::W) || is_key_down(KeyCode::Up) {
            dy -= 1.0;
        }
        if is_key_down(KeyCode::S) || is_key_down(KeyCode::Down) {
            dy += 1.0;
        }

        let step = MOVE_SPEED * dt;
        self.position.x = (self.position.x + dx * step).clamp(0.0, self.bounds.0);
        self.position.y = (self.position.y + dy * step).clamp(0.0, self.bounds.1);
    }
}

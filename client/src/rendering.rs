use client::chat::ChatLog;
use client::peers::PeerStore;
use client::SessionStatus;
use macroquad::prelude::*;
use shared::{palette_color, ColorSlot, Position, Rgb};
use std::time::Duration;

pub const PLAYER_SIZE: f32 = 28.0;
const CHAT_LINES_SHOWN: usize = 8;

/// Everything the HUD shows besides the players.
pub struct HudState<'a> {
    pub status: SessionStatus,
    pub latency: Option<Duration>,
    pub chat: &'a ChatLog,
    pub draft: Option<&'a str>,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

fn to_color(rgb: Rgb) -> Color {
    Color::new(rgb.r, rgb.g, rgb.b, 1.0)
}

impl Renderer {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn render(
        &self,
        local: Option<(&str, ColorSlot, Position)>,
        peers: &PeerStore,
        hud: HudState<'_>,
    ) {
        clear_background(Color::from_rgba(26, 26, 26, 255));
        self.draw_grid();

        for peer in peers.iter() {
            if let Some(position) = peer.position {
                self.draw_player(position, to_color(peer.color()), peer.name.as_str(), false);
            }
        }
        if let Some((name, slot, position)) = local {
            self.draw_player(position, to_color(palette_color(slot)), name, true);
        }

        self.draw_status(&hud, peers.len());
        self.draw_chat(&hud);
    }

    fn draw_grid(&self) {
        let grid = Color::from_rgba(40, 40, 40, 255);
        let mut x = 0.0;
        while x < self.width {
            draw_line(x, 0.0, x, self.height, 1.0, grid);
            x += 50.0;
        }
        let mut y = 0.0;
        while y < self.height {
            draw_line(0.0, y, self.width, y, 1.0, grid);
            y += 50.0;
        }
    }

    fn draw_player(&self, position: Position, color: Color, name: &str, is_local: bool) {
        let x = position.x - PLAYER_SIZE / 2.0;
        let y = position.y - PLAYER_SIZE / 2.0;
        draw_rectangle(x, y, PLAYER_SIZE, PLAYER_SIZE, color);

        let outline = if is_local { WHITE } else { GRAY };
        draw_rectangle_lines(x, y, PLAYER_SIZE, PLAYER_SIZE, 2.0, outline);

        let size = measure_text(name, None, 16, 1.0);
        draw_text(name, position.x - size.width / 2.0, y - 6.0, 16.0, WHITE);
    }

    fn draw_status(&self, hud: &HudState<'_>, peer_count: usize) {
        let (label, color) = match hud.status {
            SessionStatus::Connecting => ("connecting", YELLOW),
            SessionStatus::AwaitingIdentity => ("joining", YELLOW),
            SessionStatus::Joined => ("joined", GREEN),
            SessionStatus::Disconnected => ("disconnected", RED),
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, color);
        draw_text(label, 24.0, 18.0, 16.0, WHITE);

        let latency = match hud.latency {
            Some(latency) => format!("{}ms", latency.as_millis()),
            None => "-".to_string(),
        };
        draw_text(&latency, 10.0, 36.0, 16.0, WHITE);

        let players = format!("{} peers", peer_count);
        draw_text(&players, 10.0, 54.0, 16.0, WHITE);
    }

    fn draw_chat(&self, hud: &HudState<'_>) {
        let line_height = 18.0;
        let mut y = self.height - 40.0;

        for line in hud.chat.iter().rev().take(CHAT_LINES_SHOWN) {
            let text = format!("{}: {}", line.sender_name, line.text);
            draw_text(&text, 10.0, y, 16.0, LIGHTGRAY);
            y -= line_height;
        }

        match hud.draft {
            Some(draft) => {
                let prompt = format!("> {}_", draft);
                draw_text(&prompt, 10.0, self.height - 14.0, 18.0, WHITE);
            }
            None => {
                draw_text(
                    "Enter to chat, WASD or arrows to move",
                    10.0,
                    self.height - 14.0,
                    14.0,
                    GRAY,
                );
            }
        }
    }
}

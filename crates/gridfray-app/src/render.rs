//! Plain-text grid rendering of an arena snapshot.

use gridfray_core::{ArenaSnapshot, BotId, Position};
use std::collections::HashMap;
use std::fmt::Write as _;

const CELL_WIDTH: usize = 5;

/// Draw the grid as fixed-width text: `B{n}` for bots, item glyphs for
/// items, `B{n}/{glyph}` for shared cells, and `.` for empty cells.
#[must_use]
pub fn draw_grid(snapshot: &ArenaSnapshot) -> String {
    let mut bots: HashMap<Position, BotId> = HashMap::with_capacity(snapshot.bots.len());
    for bot in &snapshot.bots {
        bots.insert(bot.position, bot.id);
    }
    let mut glyphs: HashMap<Position, char> = HashMap::with_capacity(snapshot.items.len());
    for item in &snapshot.items {
        glyphs.insert(item.position, item.kind.glyph());
    }

    let mut out = String::new();
    let _ = write!(out, "{:CELL_WIDTH$}", "");
    for x in 0..snapshot.width {
        let _ = write!(out, "{x:<CELL_WIDTH$}");
    }
    out.push('\n');

    for y in 0..snapshot.height {
        let _ = write!(out, "{y:<CELL_WIDTH$}");
        for x in 0..snapshot.width {
            let position = Position::new(x, y);
            let cell = match (bots.get(&position), glyphs.get(&position)) {
                (Some(id), Some(glyph)) => format!("B{}/{glyph}", id.0),
                (Some(id), None) => format!("B{}", id.0),
                (None, Some(glyph)) => glyph.to_string(),
                (None, None) => ".".to_string(),
            };
            let _ = write!(out, "{cell:<CELL_WIDTH$}");
        }
        out.push('\n');
    }
    out
}

mod command_input;
mod input;
mod key_result;
mod search_input;

pub use command_input::{CommandEvent, CommandInput};
pub use input::{InputResult, TextInput};
pub use key_result::KeyResult;
pub use search_input::{SearchEvent, SearchInput};

use ratatui::prelude::*;

/// Rect for a one-line input overlay near the top-left of `area`.
pub(crate) fn overlay_rect(area: Rect, extra_rows: u16) -> Rect {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
  let height = (3 + extra_rows).min(area.height);
  Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height)
}

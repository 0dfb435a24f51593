pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, HeaderState};
pub use utils::{format_minutes, priority_color, progress_bar, relative_time, status_color, truncate};

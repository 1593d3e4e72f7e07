pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, entity_line, error, header, info, muted, section, status, success, summary_row, warn};
pub use table::{TableBuilder, render, stats_table};
pub use theme::{theme, Role, Theme};

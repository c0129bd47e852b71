pub mod formatting;
pub mod fs;
pub mod ids;
pub mod truncation;

pub use formatting::{format_duration, short_id};
pub use fs::atomic_write;
pub use ids::{container_name, generate_reproduction_id, sanitize_name};
pub use truncation::{preview_command, truncate_error, truncate_output};

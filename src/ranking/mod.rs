pub mod positions;

pub use positions::{compute_positions, count_changes, EXCLUDED_POSITION};

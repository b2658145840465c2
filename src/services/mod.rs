pub mod import;
pub mod moderation;
pub mod recalculation;

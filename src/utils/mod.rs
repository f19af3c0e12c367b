pub mod dates;
pub mod format;
pub mod logger;
pub mod pacing;

pub mod areas;
pub mod flags;
pub mod rides;

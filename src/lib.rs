pub mod ai;
pub mod bangs;
pub mod cache;
pub mod core;
pub mod engines;
pub mod fts;
pub mod instant;
pub mod news;
pub mod recrawler;
pub mod search;
pub mod widgets;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::AppState;

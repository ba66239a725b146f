//! Sheet sync engine: tab lifecycle, dedup strategies, write orchestration.

mod dedup;
mod engine;
mod lifecycle;
mod progress;

pub use dedup::*;
pub use engine::*;
pub use lifecycle::*;
pub use progress::*;

#[cfg(test)]
mod tests;

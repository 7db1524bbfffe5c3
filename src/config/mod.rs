// src/config/mod.rs
pub mod ai;
pub mod curator;

pub use ai::AiConfig;
pub use curator::CuratorConfig;

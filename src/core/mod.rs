//! Core helpers shared by the AI and vision layers

pub mod utils;

//! Routes chat requests to parameterized recipes: matches intent payloads
//! against a recipe catalog, tracks each conversation until its recipe has
//! what it needs, and runs ready recipes through a priority scheduler.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::AppConfig;
pub use crate::core::bootstrap::FrontDeskService;
pub use crate::core::front_desk::{FrontDesk, InboundMessage, RecipeSynthesizer, Reply};
pub use crate::core::intent::{EntityValue, IntentPayload};

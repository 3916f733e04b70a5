pub mod bootstrap;
pub mod bounded;
pub mod front_desk;
pub mod intent;
pub mod lifecycle;
pub mod matcher;
pub mod recipe;
pub mod requests;
pub mod scheduler;

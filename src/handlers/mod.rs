pub mod discord;
pub mod health;

pub use discord::{discord_success_page, discord_success_props};
pub use health::health_check;

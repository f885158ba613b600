pub mod user;

pub use user::{DiscordTokenStore, UserLookup, UserRepository};

pub mod connect_result;
pub mod discord;
pub mod session;

pub use connect_result::{ConnectOutcome, ConnectResultQuery, resolve_outcome};
pub use discord::{DiscordService, LinkedAccountResolver};
pub use session::{CookieSessionReader, SessionCodec, SessionReader, SessionUser};

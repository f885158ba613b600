pub mod linked_account;
pub mod user;

pub use linked_account::{ErrorDetail, LinkedAccountInfo};
pub use user::User;

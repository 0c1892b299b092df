//! Concrete resources exposed by the API

pub mod story;
pub mod user;

pub use story::Story;
pub use user::User;

// Telegram Bot API types used by the relay's webhook intake.

pub mod update;

pub use update::Update;

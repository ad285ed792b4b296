pub mod kea;
pub mod telegram;
pub mod watch;

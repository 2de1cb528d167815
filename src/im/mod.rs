pub mod api;
pub mod channel;
pub mod client;
pub mod contact;
pub mod error;
pub mod listener;
pub mod message;
pub mod room;
pub mod serialization;
pub mod typing;
pub mod types;

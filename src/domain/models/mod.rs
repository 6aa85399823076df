mod api;
mod conversation;
mod event;
mod message;

pub use api::*;
pub use conversation::*;
pub use event::*;
pub use message::*;

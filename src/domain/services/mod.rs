mod app_state;
mod council;
mod reducer;
mod retry;

pub use app_state::*;
pub use council::*;
pub use reducer::*;
pub use retry::*;

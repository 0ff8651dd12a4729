mod builder;
mod controller;
mod display;
mod state;
#[cfg(test)]
mod tests;

pub use builder::SessionControllerBuilder;
pub use controller::{ScanStats, SessionController, SessionInput, SessionSnapshot};
pub use display::{DisplayedResult, ExpiryTimer};
pub use state::SessionState;

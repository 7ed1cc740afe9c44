mod api;
mod clipboard;
mod config;
mod logging;
mod transport;
mod wire;

pub use api::*;
pub use clipboard::*;
pub use config::*;
pub use logging::*;
pub use transport::*;
pub use wire::*;

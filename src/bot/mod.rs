pub mod command;
pub mod render;
pub mod router;

pub use command::CommandError;
pub use render::{render, render_error};
pub use router::{CommandRouter, Inbound, Reply};

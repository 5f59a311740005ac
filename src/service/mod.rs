//! Service module: one supervised process and its lifecycle.

mod command;
mod error;
mod process;
mod state;
mod supervisor;

pub use command::*;
pub use error::*;
pub use process::*;
pub use state::*;
pub use supervisor::*;

//! HTTP control surface for starting and stopping the service.

mod api;
mod error;
mod handlers;
mod server;

pub use api::{CommandResponse, StatusResponse};
pub use error::ReceptionError;
pub use handlers::{restart_service, AppState};
pub use server::ReceptionServer;

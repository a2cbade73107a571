pub mod client;
pub mod proto;
pub mod session;

pub use client::Controller;
pub use proto::Record;
pub use session::{ConnectParams, ControllerError, Session};

//! # Marquee Server
//!
//! The remote-control gateway for a marquee display fleet: an HTTP
//! request/response API plus a WebSocket push channel, both routed to the
//! display actors through the reconciliation controller.

mod api;
mod gateway;

pub use api::{ApiResponse, ServerMessage, ALL_DISPLAYS};
pub use gateway::{ApiGateway, STATUS_SETTLE_TIME};

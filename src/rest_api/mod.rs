//! REST surface for the planner and dispatcher
//!
//! Exposes the planning trigger, health probe, one-off submissions and
//! the dispatch entrypoint over HTTP.

mod dto;
mod handlers;
mod server;

pub use dto::SubmitRequest;
pub use server::{dispatcher_router, planner_router, run_server, AppState};

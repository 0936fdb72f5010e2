//! HTTP gateway: receives bridge webhooks, feeds answers into the live
//! roll call and runs chat commands.

pub mod commands;
pub mod routes;
pub mod server;

pub use commands::{Command, CommandHandler};
pub use server::{AppState, build_router, start};

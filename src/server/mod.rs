mod handlers;
mod models;
mod page;
mod state;

pub use handlers::run_server;

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod server;
pub mod state;
pub mod stream;

mod util;

pub mod config;
pub mod service;

pub use config::ServiceConfig;
pub use service::{
    AppState, CORRELATION_HEADER, SESSION_HEADER, build_router, create_app, create_app_state,
};

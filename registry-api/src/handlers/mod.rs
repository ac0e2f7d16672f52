mod app;
mod error;
mod extensions;
mod extract_rules;
mod extract_sources;
mod pipelines;
mod transform_functions;

pub use app::{add_routes, AppState};

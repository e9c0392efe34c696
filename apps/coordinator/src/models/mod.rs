pub mod api;
pub mod domain;

pub use api::ApiResponse;

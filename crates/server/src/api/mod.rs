pub mod access;
pub mod brands;
pub mod callbacks;
pub mod campaigns;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod requests;
pub mod routes;

pub use error::ApiError;
pub use routes::create_router;

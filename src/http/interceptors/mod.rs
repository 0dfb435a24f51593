pub mod auth;
pub mod cache;
pub mod errors;
pub mod loading;
pub mod retry;

pub use auth::AuthInterceptor;
pub use cache::CacheInterceptor;
pub use errors::ErrorInterceptor;
pub use loading::{debounce_busy, InFlightGuard, LoadingInterceptor, LoadingTracker};
pub use retry::RetryInterceptor;

//! HTTP plumbing: typed requests, the interceptor chain and the envelope
//! unwrapping client.
//!
//! Request flow for the main API, outermost first:
//! loading → errors → retry → auth → response cache → transport.

mod client;
mod error;
pub mod interceptors;
mod transport;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ApiClient;
pub use error::{ApiError, ErrorKind};
pub use transport::{Handler, ReqwestTransport};
pub use types::{
  field_errors, ApiRequest, ApiResponse, Envelope, Method, Page, Pagination, SKIP_LOADING_HEADER,
};

use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionStore;
use crate::toast::Toasts;
use interceptors::{
  AuthInterceptor, CacheInterceptor, ErrorInterceptor, LoadingInterceptor, LoadingTracker,
  RetryInterceptor,
};

/// The assembled HTTP clients plus handles to the stateful interceptors.
#[derive(Clone)]
pub struct HttpStack {
  /// Client for `api.url`
  pub api: ApiClient,
  /// Client for `api.auth_url`; no response cache, no logout on 401
  pub auth: ApiClient,
  pub cache: Arc<CacheInterceptor>,
  pub loading: Arc<LoadingTracker>,
}

impl HttpStack {
  pub fn new(config: &Config, session: Arc<SessionStore>, toasts: Toasts) -> Result<Self, ApiError> {
    let timeout = config.api.timeout();
    let api_transport = Arc::new(ReqwestTransport::new(&config.api.url, timeout)?);
    let auth_transport = Arc::new(ReqwestTransport::new(&config.api.auth_url, timeout)?);
    Ok(Self::with_transports(
      config,
      api_transport,
      auth_transport,
      session,
      toasts,
    ))
  }

  pub fn with_transports(
    config: &Config,
    api_transport: Arc<dyn Handler>,
    auth_transport: Arc<dyn Handler>,
    session: Arc<SessionStore>,
    toasts: Toasts,
  ) -> Self {
    let loading = Arc::new(LoadingTracker::new());

    let cache = Arc::new(CacheInterceptor::new(
      api_transport,
      config.cache.invalidate_on_write,
    ));
    let authed = Arc::new(AuthInterceptor::new(cache.clone(), session.clone()));
    let retried = Arc::new(RetryInterceptor::new(authed, config.api.retries));
    let errors = Arc::new(ErrorInterceptor::new(retried, session.clone(), toasts));
    let api_chain = Arc::new(LoadingInterceptor::new(errors, loading.clone()));

    let auth_chain = Arc::new(LoadingInterceptor::new(
      Arc::new(AuthInterceptor::new(auth_transport, session)),
      loading.clone(),
    ));

    Self {
      api: ApiClient::new(api_chain),
      auth: ApiClient::new(auth_chain),
      cache,
      loading,
    }
  }
}

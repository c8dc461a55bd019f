//! Request and response rewriting applied before recording

use std::fmt;
use std::sync::Arc;

use crate::snapshot::{RequestSnapshot, ResponseSnapshot};

/// Rewrites a request before it is recorded or looked up; `None` skips it
pub type RequestHook = Arc<dyn Fn(RequestSnapshot) -> Option<RequestSnapshot> + Send + Sync>;

/// Rewrites a response before it is recorded
pub type ResponseHook = Arc<dyn Fn(ResponseSnapshot) -> ResponseSnapshot + Send + Sync>;

/// Header filtering and user hooks
///
/// Request processing is symmetric: the same filtering and hook run on the
/// record path and on the lookup path, so a rewritten recording is found
/// by the request that produced it.
#[derive(Clone, Default)]
pub struct RecordHooks {
    filter_headers: Vec<String>,
    before_record_request: Option<RequestHook>,
    before_record_response: Option<ResponseHook>,
}

impl RecordHooks {
    /// No filtering and no hooks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip these header names (case-insensitive) from requests
    #[must_use]
    pub fn filter_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_headers = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    /// Install the request hook
    #[must_use]
    pub fn before_record_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(RequestSnapshot) -> Option<RequestSnapshot> + Send + Sync + 'static,
    {
        self.before_record_request = Some(Arc::new(hook));
        self
    }

    /// Install the response hook
    #[must_use]
    pub fn before_record_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(ResponseSnapshot) -> ResponseSnapshot + Send + Sync + 'static,
    {
        self.before_record_response = Some(Arc::new(hook));
        self
    }

    /// Filter headers then run the request hook
    #[must_use]
    pub fn prepare_request(&self, mut request: RequestSnapshot) -> Option<RequestSnapshot> {
        if !self.filter_headers.is_empty() {
            request
                .headers
                .retain(|(name, _)| !self.filter_headers.contains(&name.to_lowercase()));
        }

        match &self.before_record_request {
            Some(hook) => hook(request),
            None => Some(request),
        }
    }

    /// Run the response hook
    #[must_use]
    pub fn prepare_response(&self, response: ResponseSnapshot) -> ResponseSnapshot {
        match &self.before_record_response {
            Some(hook) => hook(response),
            None => response,
        }
    }
}

impl fmt::Debug for RecordHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHooks")
            .field("filter_headers", &self.filter_headers)
            .field("before_record_request", &self.before_record_request.is_some())
            .field("before_record_response", &self.before_record_response.is_some())
            .finish()
    }
}

//! Transport decorator that serves requests from a cassette

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cassette::{Cassette, Lookup};
use crate::exception::{ExceptionRegistry, Failure};
use crate::snapshot::{Outcome, RequestSnapshot, ResponseSnapshot};
use crate::transport::{Transport, TransportFuture};
use crate::DvdError;

/// Routes requests through a cassette before the live transport
///
/// - A matching recording is replayed; a recorded failure is rebuilt
///   through the [`ExceptionRegistry`] and returned as the error.
/// - A request declined by the request hook always goes to `live`.
/// - A miss on a cassette loaded from storage is an
///   [`DvdError::UnmatchedInReplay`] error; `live` is never called.
/// - A miss on a fresh cassette goes to `live` and the outcome, response or
///   failure, is recorded before it is returned.
pub struct Player<T> {
    cassette: Arc<Cassette>,
    registry: Arc<ExceptionRegistry>,
    live: T,
}

impl<T: Transport> Player<T> {
    /// Wrap `live` with the built-in failure registry
    #[must_use]
    pub fn new(cassette: Arc<Cassette>, live: T) -> Self {
        Self {
            cassette,
            registry: Arc::new(ExceptionRegistry::with_defaults()),
            live,
        }
    }

    /// Use a custom failure registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ExceptionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Cassette serving this player
    #[must_use]
    pub fn cassette(&self) -> &Arc<Cassette> {
        &self.cassette
    }

    /// Wrapped live transport
    #[must_use]
    pub fn live(&self) -> &T {
        &self.live
    }

    /// Serve a request from the cassette or the live transport
    ///
    /// # Errors
    ///
    /// Returns the replayed or live failure, or `UnmatchedInReplay` for a
    /// miss on a replay-only cassette
    pub async fn play(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, Failure> {
        match self.cassette.lookup(request) {
            Lookup::Matched(Outcome::Response(response)) => Ok(response),
            Lookup::Matched(Outcome::Exception(snapshot)) => {
                debug!("Replaying recorded failure of kind '{}'", snapshot.kind);
                Err(self.registry.reconstruct(&snapshot))
            }
            Lookup::Ignored => {
                debug!("Passing through {} {}", request.method, request.url());
                self.live.send(request).await
            }
            Lookup::NoMatch if self.cassette.is_from_storage() => {
                let url = request.url();
                warn!("No recording for {} {}", request.method, url);
                Err(Box::new(DvdError::UnmatchedInReplay {
                    method: request.method.clone(),
                    url,
                }))
            }
            Lookup::NoMatch => self.record_live(request).await,
        }
    }

    async fn record_live(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, Failure> {
        let result = self.live.send(request).await;

        let outcome = match &result {
            Ok(response) => Outcome::Response(response.clone()),
            Err(failure) => Outcome::Exception(self.registry.capture(failure.as_ref())),
        };
        self.cassette.record(request.clone(), outcome)?;

        result
    }
}

impl<T: Transport> Transport for Player<T> {
    fn send<'a>(&'a self, request: &'a RequestSnapshot) -> TransportFuture<'a> {
        Box::pin(self.play(request))
    }
}

impl<T> std::fmt::Debug for Player<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("cassette", &self.cassette)
            .finish_non_exhaustive()
    }
}

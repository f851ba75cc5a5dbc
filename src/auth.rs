//! gRPC interceptor that injects the session token into outgoing requests.

use std::sync::{Arc, RwLock};

/// Shared, refreshable session token. An empty string means "no session".
pub(crate) type SharedToken = Arc<RwLock<String>>;

/// gRPC interceptor that injects a Bearer token from a shared string.
///
/// The token is read on every intercepted request with a synchronous
/// `read()` lock because tonic interceptors are called synchronously.
/// Writing a new token into the lock takes effect on the next RPC, which
/// is how the session feed propagates token refreshes without
/// reconnecting. If the token string is empty, no `authorization` header
/// is added.
///
/// # Panics
///
/// Panics if the inner [`RwLock`] is poisoned (a writer panicked while
/// holding the write lock). This is treated as an invariant violation.
#[derive(Clone)]
pub(crate) struct BearerInterceptor {
    pub(crate) token: SharedToken,
}

impl tonic::service::Interceptor for BearerInterceptor {
    fn call(&mut self, mut req: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        let token = self.token.read().expect("token RwLock poisoned");
        if token.is_empty() {
            return Ok(req);
        }
        let header = format!("Bearer {token}");
        let value = tonic::metadata::MetadataValue::try_from(header.as_str())
            .map_err(|_| tonic::Status::internal("session token is not valid header data"))?;
        req.metadata_mut().insert("authorization", value);
        Ok(req)
    }
}

//! Traffic control for calls to the note server.
//!
//! Every API call is layered, outermost first:
//!
//! 1. [`RequestGateway`]: waits for a concurrency slot and rate budget.
//! 2. [`RetryExecutor`]: retries transient failures with backoff, fails fast
//!    when the [`ConnectivityProbe`] reports offline.
//! 3. [`CircuitBreaker`]: fails fast while the endpoint class looks dead.
//!
//! The gateway slot is held for the whole retry sequence, so a request being
//! retried never lets a newer one overtake it.

pub mod circuit;
pub mod gateway;
pub mod probe;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitState};
pub use gateway::{GatewayConfig, GatewayStatus, RequestGateway};
pub use probe::{AlwaysOnline, ConnectivityProbe, ManualProbe};
pub use retry::{RetryConfig, RetryExecutor};

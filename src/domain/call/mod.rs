//! Call bounded context
//!
//! Call sessions, their registry and the transport transitions that drive
//! their lifecycle.

pub mod registry;
pub mod session;
pub mod signal;
pub mod transport;

pub use registry::SessionRegistry;
pub use session::{CallSession, TeardownCause};
pub use signal::{CompletionSignal, ConnectionState, IceConnectionState, PeerSignal};
pub use transport::PeerTransport;

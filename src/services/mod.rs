pub mod breaker;
pub mod delivery;
pub mod dispatcher;
pub mod fallback;
pub mod manual_queue;
pub mod receipt;
pub mod reconcile;
pub mod scheduler;
pub mod stats;
pub mod transport;

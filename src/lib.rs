//! Receipt dispatch for the food-street ordering app
//!
//! After a payment succeeds, each shop involved in the order gets its own
//! receipt on its own network printer. Delivery goes through per-shop FIFO
//! queues (one job in flight per printer), retries with exponential backoff,
//! a circuit breaker per printer, and SMS/email/manual-print fallbacks when a
//! printer stays unreachable. The entry point,
//! [`ReceiptDispatcher::dispatch_receipts`](services::dispatcher::ReceiptDispatcher::dispatch_receipts),
//! never fails and never waits longer than its safety timeout.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

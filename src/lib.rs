//! Order lifecycle and cross-view synchronization.
//!
//! One [`order_actor::OrderService`] owns the order snapshot. Views ask it
//! for transitions through an [`clients::OrderClient`], and learn about
//! changes made elsewhere through the [`sync::Broadcaster`] bus. The
//! lifecycle rules and the cancellation window are pure functions in
//! [`lifecycle`] and [`cancellation`].

pub mod app_system;
pub mod cancellation;
pub mod clients;
pub mod clock;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod order_actor;
pub mod store;
pub mod sync;
pub mod views;

#[cfg(test)]
mod mock_framework;

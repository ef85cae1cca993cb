//! # UI Analyzer API
//!
//! Endpoint plugins for the UI Analyzer backend and an HTTP client for the
//! hosted-checkout payment provider.

pub mod gateway;
pub mod plugins;

pub use gateway::{HttpCheckoutGateway, HttpGatewayConfig};
pub use plugins::{AuthPlugin, PaymentsPlugin, SubscriptionsPlugin, UsersPlugin};

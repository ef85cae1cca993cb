pub mod auth;
pub mod helpers;
pub mod payments;
pub mod subscriptions;
pub mod users;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::AuthPlugin;
pub use payments::PaymentsPlugin;
pub use subscriptions::SubscriptionsPlugin;
pub use users::UsersPlugin;

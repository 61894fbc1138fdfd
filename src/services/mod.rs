// Checkout
pub mod catalog;
pub mod orders;
pub mod pricing;

// Order lifecycle and read side
pub mod order_status;
pub mod visibility;

// Settlement
pub mod payment_provider;
pub mod payments;
pub mod wallet;

// Shared lookups
pub mod entrepreneurs;

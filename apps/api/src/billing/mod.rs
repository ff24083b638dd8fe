// Billing: credit ledger, credit packs, and the Stripe Checkout integration.
// A credit is spent each time a proposal is created.

pub mod credits;
pub mod handlers;
pub mod stripe;

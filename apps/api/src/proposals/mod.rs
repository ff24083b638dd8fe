// Proposals: contractor-facing scope-of-work documents with a price range and
// client acceptance state. Creating one spends a credit.

pub mod handlers;
pub mod lifecycle;
pub mod pricing;
pub mod service;

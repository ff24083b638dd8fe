// Mobile jobs: the photo-capture flow that feeds the drafting pipeline and ends
// in a submitted proposal.

pub mod handlers;
pub mod service;

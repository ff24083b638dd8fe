// Mobile job drafting: photos -> per-photo findings -> aggregated findings ->
// GOOD/BETTER/BEST proposal draft.
// Runs out of band on the Redis-backed queue; handlers only flip job status.

pub mod aggregate;
pub mod draft;
pub mod pipeline;
pub mod prompts;
pub mod queue;
pub mod status;
pub mod synthesizer;

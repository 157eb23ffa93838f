// Job submission and lookup. The worker in `analysis` consumes what is queued here.

pub mod handlers;
pub mod store;

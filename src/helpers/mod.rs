pub mod backoff;
pub mod events;

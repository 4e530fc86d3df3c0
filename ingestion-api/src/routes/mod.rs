pub mod ingest;
pub mod liveness;
pub mod logs;
pub mod readiness;

//! Optional JSONL capture of webhook deliveries and GitHub API traffic.
//!
//! Recordings make it possible to replay a production incident (which PR was
//! evaluated, which calls were made, what GitHub answered) without turning on
//! debug logging for the whole process.

pub mod logger;
pub mod middleware;
pub mod sanitizer;
pub mod types;

pub use logger::RecordingLogger;
pub use middleware::RecordingMiddleware;
pub use sanitizer::Sanitizer;
pub use types::*;

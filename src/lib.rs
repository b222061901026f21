pub mod config;
pub mod delay;
pub mod logger;
pub mod normalize;
pub mod page;
pub mod record;
pub mod resolver;
pub mod roster;
pub mod session;
pub mod store;
pub mod structural;
pub mod vision;

// Exporting types for convenience
pub use record::ProfileRecord;
pub use roster::RosterEntry;
pub use session::Session;
pub use store::OutputStore;
pub use vision::{VisionClient, VisionOutcome};

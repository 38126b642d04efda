//! Redemption of decoded payloads
//!
//! - `outcome`: the closed set of scan results
//! - `store`: the code store contract and an in-memory store
//! - `file_store`: a JSON-file backed store
//! - `coordinator`: payload classification and the redemption call

pub mod coordinator;
pub mod file_store;
pub mod outcome;
pub mod store;

pub use coordinator::{Classification, RedemptionCoordinator, scan_url};
pub use file_store::JsonFileCodeStore;
pub use outcome::ScanOutcome;
pub use store::{CodeRecord, CodeStore, MemoryCodeStore, Redemption};

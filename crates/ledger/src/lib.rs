pub mod batch_store;
pub mod service;
pub mod sqlite_store;
pub mod state;
pub mod store;

pub use batch_store::*;
pub use service::*;
pub use sqlite_store::SqliteLedgerStore;
pub use state::*;
pub use store::*;

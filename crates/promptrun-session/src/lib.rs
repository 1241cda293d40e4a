//! Session identity, history storage and orchestration.
//!
//! Provides:
//! - `SessionIdentity` - issue and validate session tokens
//! - History stores (text log, JSON lines, memory)
//! - `SessionManager` - prompt to completion to execution to history

pub mod identity;
pub mod manager;
pub mod storage;

pub use identity::{Identity, SESSION_COOKIE, SessionIdentity};
pub use manager::{Generation, ManagerError, SessionManager};
pub use storage::HistoryFormat;

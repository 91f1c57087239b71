pub mod session;
pub mod storage;

pub use session::{AuthContext, Session, User, UserId, ACCESS_LEVEL_ADMIN};
pub use storage::{FilePreferenceStore, MemoryPreferenceStore, PreferenceError, PreferenceStore};

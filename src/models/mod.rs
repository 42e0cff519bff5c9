pub mod session;
pub mod user;

pub use session::{RevocationEntry, SessionRecord, SessionSummary};
pub use user::{AuthResponse, LoginRequest, NewUser, RegisterRequest, User, UserProfile};

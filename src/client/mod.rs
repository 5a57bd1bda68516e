/// API client
///
/// `SessionManager` owns the token pair and drives refresh-and-retry.
/// Resource components such as `UsersApi` receive it by `Arc` and never
/// hold state of their own.

mod error;
mod session;
mod users;

pub use error::ClientError;
pub use session::{SessionManager, SessionSnapshot, SessionStatus};
pub use users::UsersApi;

pub mod gate;
pub mod handlers;
pub mod session;

pub use gate::{AdminIdentity, AuthStatus};
pub use session::SessionStore;

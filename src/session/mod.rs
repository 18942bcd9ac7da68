pub mod remote_client;
pub mod session_manager;

pub use remote_client::{RemoteAICallbacks, RemoteAIClient, RemoteSession};
pub use session_manager::SessionManager;

pub mod error;
pub mod http;
pub mod mock;
pub mod retry;
pub mod session;
pub mod traits;

pub use error::RemoteError;
pub use http::HttpDirectory;
pub use mock::MockDirectory;
pub use retry::RetryPolicy;
pub use session::Session;
pub use traits::{RemoteDirectory, ResourceEntity};

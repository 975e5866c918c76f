pub mod change;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod record;
pub mod resource;
pub mod state;
pub mod time;

pub use change::{ChangeSpec, OperationKind};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::OperationId;
pub use record::{ItemKey, ItemOutcome, ItemResult, OperationRecord, OperationStatus};
pub use resource::{ResourceRef, ResourceType};
pub use state::ResourceState;
pub use time::{TimestampMs, now_ms};

mod orchestration;
mod record;
mod session;
mod task;
mod workspace;

pub use orchestration::OrchestrationResult;
pub use record::{RecordStatus, SessionRecord};
pub use session::{Session, SessionStatus};
pub use task::{Priority, Task, TaskContext, TaskDocMetadata, TaskMetadata, TaskStatus};
pub use workspace::WorkspaceInfo;

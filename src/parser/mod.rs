mod slug;
mod task_spec;

pub use slug::{is_valid_id, sanitize_id, slug_or};
pub use task_spec::TaskSpecParser;

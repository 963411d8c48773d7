// Submission dataset: load the CodeWorkout tables, join them, and reduce the
// joined stream to one best attempt per student and problem.

pub mod join;
pub mod loader;
pub mod models;
pub mod selection;

pub use join::{filter_term, join_tables};
pub use loader::{load_curriculum, load_problems, load_tables, LoadError, TablePaths};
pub use models::SubmissionRecord;
pub use selection::select_best_attempts;

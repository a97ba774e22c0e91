pub mod completions;
pub mod course_progress;
pub mod courses;
pub mod units;

pub const META: &str = "meta";

// Content
pub const COURSES: &str = "courses";
pub const CONTAINERS: &str = "containers";
pub const COURSE_CONTAINERS: &str = "course_containers";
pub const UNITS: &str = "units";
pub const CONTAINER_UNITS: &str = "container_units";
pub const VARIANT_INDEX: &str = "variant_index";

// Learner state
pub const COMPLETIONS: &str = "completions";
pub const ATTEMPT_HISTORY: &str = "attempt_history";
pub const UNIT_VIEWS: &str = "unit_views";
pub const COURSE_PROGRESS: &str = "course_progress";

pub mod events;
pub mod jobs;
pub mod work_set;

pub mod extraction;
pub mod format;
pub mod jobs;
pub mod path;
pub mod render;
pub mod template;
pub mod validation;

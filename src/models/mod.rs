pub mod draft;
pub mod enums;
pub mod record;

pub use draft::*;
pub use record::*;

pub mod enums;
pub mod document;
pub mod prescription;
pub mod record;

pub use document::*;
pub use prescription::*;
pub use record::*;

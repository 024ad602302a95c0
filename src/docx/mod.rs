pub mod apply;
pub mod extract;
pub mod package;
pub mod validate;
pub mod xml;

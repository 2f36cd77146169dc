pub mod blob;
pub mod hooks;

pub use blob::Blob;
pub use hooks::{DrainerHooks, NoopHooks};

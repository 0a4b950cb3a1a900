pub mod compose;
pub mod serve;

pub use compose::{compose, ComposeArgs};
pub use serve::{serve, ServeArgs};

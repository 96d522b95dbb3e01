pub mod events;
pub mod icons;

pub use events::{EventPrinter, UiMode};

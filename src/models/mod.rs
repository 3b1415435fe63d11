pub mod media_item;
pub mod preview;

pub use media_item::*;
pub use preview::*;

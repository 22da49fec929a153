//! Built-in transforms

mod drop_columns;
mod mime_type;
mod resize;

pub use drop_columns::DropColumns;
pub use mime_type::{with_mime_type, SetMimeType};
pub use resize::ResizeImages;

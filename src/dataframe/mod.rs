pub mod editor;

pub use editor::{ResultEditor, SortColumn};

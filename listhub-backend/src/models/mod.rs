pub mod item;

pub use item::{Item, ItemStatus, ListFilter, extract_due, extract_tags};

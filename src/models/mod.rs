pub mod clip;

pub use clip::{ClipItem, ItemId, LookupError, find_by_id_prefix};

pub mod entry;
pub mod split_allocator;

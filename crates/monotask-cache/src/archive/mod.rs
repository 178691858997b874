//! Archive create/restore. Grounded on
//! `turborepo-cache/src/cache_archive/{create,restore,restore_regular,restore_symlink,restore_directory}.rs`,
//! adapted from zstd to gzip compression per spec.md §4.4/§6.

mod create;
mod restore;
mod restore_directory;
mod restore_regular;
mod restore_symlink;

pub use create::CacheWriter;
pub use restore::CacheReader;

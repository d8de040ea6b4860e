pub mod cache;
pub mod record;
pub mod sql;
pub mod store;

pub use cache::{Zone, ZoneCache, ZoneSnapshot};
pub use record::{
    CaaContent, MxContent, Record, RecordContent, SoaContent, SrvContent, resolve_ttl,
};
pub use sql::SqlRecordStore;
pub use store::{MemoryRecordStore, RecordStore};

/// Lowercase a domain name and drop the trailing root dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

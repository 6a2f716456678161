pub mod identity;
pub mod memory;
pub mod notifier;
pub mod pg_store;

pub use identity::StaticIdentity;
pub use memory::MemoryStore;
pub use notifier::LogNotifier;
pub use pg_store::PgStore;

mod storage;

pub use storage::MemoryTableBackend;

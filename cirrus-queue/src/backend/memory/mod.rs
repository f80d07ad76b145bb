mod storage;

pub use storage::MemoryQueueBackend;

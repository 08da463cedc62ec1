#![doc = include_str!(concat!(env!("OUT_DIR"), "/store_README.md"))]

mod doc_store;
mod frame;
mod fs_storage;
mod memory_storage;
mod storage;
mod transport;
mod types;

#[cfg(feature = "native-sync")]
mod tcp_transport;

pub use doc_store::{DocStore, ProcessStats};
pub use frame::{FRAME_SYNC, decode_sync_frame, encode_sync_frame};
pub use fs_storage::FsStorage;
pub use memory_storage::MemoryStorage;
pub use storage::{DocStorage, StorageResult};
pub use transport::{LinkControl, MemoryTransport, Transport};
pub use types::DocumentId;

#[cfg(feature = "native-sync")]
pub use tcp_transport::{TcpEndpoint, TcpTransport};

//! [`Backend`](deepskill_core::backend::Backend) implementations.

pub mod composite;
pub mod filesystem;
pub mod state;
pub mod store;
pub mod utils;

pub use composite::CompositeBackend;
pub use filesystem::FilesystemBackend;
pub use state::StateBackend;
pub use store::StoreBackend;

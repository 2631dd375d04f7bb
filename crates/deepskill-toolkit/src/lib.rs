//! Backends and ready-made tools for deepskill agents.
//!
//! - [`backends`]: state, filesystem, store and routed composite storage
//! - [`builtin`]: file, todo and shell tools
//! - [`web`]: search and page fetching for research agents

pub mod backends;
pub mod builtin;
pub mod web;

pub use backends::{CompositeBackend, FilesystemBackend, StateBackend, StoreBackend};
pub use builtin::{create_filesystem_tools, create_todos_tools, ShellConfig, ShellTool};
pub use web::{FetchUrlTool, TavilyConfig, TavilySearchTool};

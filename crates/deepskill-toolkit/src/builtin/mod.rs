//! Built-in tools for common agent operations

pub mod filesystem;
pub mod shell;
pub mod todos;

pub use filesystem::{
    create_filesystem_tools, EditFileTool, GlobTool, GrepOutputMode, GrepTool, LsTool,
    ReadFileTool, WriteFileTool,
};
pub use shell::{ShellConfig, ShellTool};
pub use todos::{create_todos_tools, ReadTodosTool, WriteTodosTool};

//! Todo list tools used by the planning middleware.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use deepskill_core::state::{StateDiff, TodoItem, TodoStatus};
use deepskill_core::tools::{Tool, ToolBox, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::Value;

/// Replaces the agent's todo list
pub struct WriteTodosTool;

#[derive(Deserialize)]
struct WriteTodosArgs {
    todos: Vec<TodoItem>,
}

#[async_trait]
impl Tool for WriteTodosTool {
    fn schema(&self) -> ToolSchema {
        let todo_item = ToolParameterSchema::object(
            [
                ("content", ToolParameterSchema::string("The todo item description")),
                (
                    "status",
                    ToolParameterSchema::string_enum(
                        "Status of the todo",
                        ["pending", "in_progress", "completed"],
                    ),
                ),
            ],
            &["content", "status"],
        );

        ToolSchema::new(
            "write_todos",
            "Update the agent's todo list to track task progress",
            ToolParameterSchema::object(
                [("todos", ToolParameterSchema::array("List of todo items", todo_item))],
                &["todos"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: WriteTodosArgs = serde_json::from_value(args)?;

        if let Some(state_handle) = &ctx.state_handle {
            let mut state = state_handle
                .write()
                .map_err(|_| anyhow!("todo state lock poisoned"))?;
            state.todos = args.todos.clone();
        }

        let count = args.todos.len();
        let diff = StateDiff {
            todos: Some(args.todos),
            ..StateDiff::default()
        };
        let message = ctx.text_response(format!("Updated todo list with {count} items"));
        Ok(ToolResult::with_state(message, diff))
    }
}

/// Reads back the current todo list
pub struct ReadTodosTool;

#[async_trait]
impl Tool for ReadTodosTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::no_params("read_todos", "Read the current todo list to check task progress")
    }

    async fn execute(&self, _args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let todos = match &ctx.state_handle {
            Some(handle) => handle
                .read()
                .map_err(|_| anyhow!("todo state lock poisoned"))?
                .todos
                .clone(),
            None => ctx.state.todos.clone(),
        };

        if todos.is_empty() {
            return Ok(ToolResult::text(&ctx, "No todos found."));
        }

        let list = todos
            .iter()
            .enumerate()
            .map(|(i, todo)| {
                let status = match todo.status {
                    TodoStatus::Completed => "COMPLETED",
                    TodoStatus::InProgress => "IN_PROGRESS",
                    TodoStatus::Pending => "PENDING",
                };
                format!("{}. [{status}] {}", i + 1, todo.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult::text(
            &ctx,
            format!("Current TODO list ({} items):\n{list}", todos.len()),
        ))
    }
}

pub fn create_todos_tools() -> Vec<ToolBox> {
    vec![Arc::new(WriteTodosTool), Arc::new(ReadTodosTool)]
}

pub mod ticket_tools;
pub mod tools;

pub use ticket_tools::{TicketBoardTool, TicketLinkTool, TicketSearchTool, TicketTool};
pub use tools::{Tool, ToolHandler, ToolRegistry};

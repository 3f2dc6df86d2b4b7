pub mod block;
pub mod chain;
pub mod event;
pub mod script;
pub mod workspace;

pub use block::{Block, BlockId, Condition, Opcode, ParamValue, Parameters};
pub use chain::{ConnectError, ConnectionRegistry, Proximity};
pub use event::{LogEvent, LogLevel, LogSink, MemoryLog};
pub use workspace::{Workspace, WorkspaceError};

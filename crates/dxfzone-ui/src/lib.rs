//! dxfzone 会话层
//!
//! 与界面框架无关的状态：配置、选择模型和提交流程。

pub mod config;
pub mod session;

pub use config::ToolConfig;
pub use session::{BoundaryRole, Mode, PickOutcome, SelectedLoop, Selection, Session, SessionError};

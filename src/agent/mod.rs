//! 智能体层：能力边界、结构化结果协议、子任务驱动器与内置 ReAct 能力

pub mod capability;
pub mod react;
pub mod result;
pub mod step;

pub use capability::{AgentCapability, AgentFragment, FragmentStream, TurnRequest};
pub use react::ReactAgent;
pub use result::{extract_json, parse_structured_result, ResultError, StructuredResult};
pub use step::{AgentStep, StepOutcome};

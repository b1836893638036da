// SYNOID Agent Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod protocol;

pub use protocol::{parse_agent_response, AgentAnalysis, RequestContext};

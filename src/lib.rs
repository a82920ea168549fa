//! Steward - 可撤销的智能体动作
//!
//! 模块划分：
//! - **activity**: 活动实体与存储抽象
//! - **agent**: 无头 Agent 运行时（组装各组件，暴露 Turn 与撤销接口）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、协作式取消
//! - **fallback**: 无模型时的规则意图分类
//! - **journal**: 动作日志与乐观并发撤销
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **react**: Turn 编排主循环、系统指令、过程事件
//! - **storage**: SQLite 持久化
//! - **stream**: SSE 事件编解码
//! - **tools**: 工具箱（记录 / 修改 / 删除 / 汇总 / 建议）与调度器

pub mod activity;
pub mod agent;
pub mod config;
pub mod core;
pub mod fallback;
pub mod journal;
pub mod llm;
pub mod observability;
pub mod react;
pub mod storage;
pub mod stream;
pub mod tools;

pub use agent::{Agent, TurnInput};

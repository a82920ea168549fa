//! 工具输入 JSON Schema 生成（schemars）
//!
//! 注入模型请求的 tools 定义，让模型按声明的结构生成参数。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 输入类型的 JSON Schema；序列化失败时退回空 object schema
pub fn input_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {},
        })
    })
}

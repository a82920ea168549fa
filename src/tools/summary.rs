//! 只读工具：今日汇总、专注建议

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::activity::{Activity, ActivityCategory, ActivityStore};
use crate::core::ToolError;
use crate::tools::{Block, BlockSink, Tool, ToolContext, ToolName, ToolOutput};

/// 偏好分类今日少于该分钟数时优先建议它
const PREFERRED_THRESHOLD_MINUTES: u32 = 60;

/// 参与建议的分类（Other 不建议）
const SUGGESTABLE: [ActivityCategory; 4] = [
    ActivityCategory::Work,
    ActivityCategory::Exercise,
    ActivityCategory::Learning,
    ActivityCategory::Rest,
];

/// 今天（UTC 日历日）的 [起, 止)
fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

async fn today_activities(ctx: &ToolContext) -> Result<Vec<Activity>, ToolError> {
    let (from, to) = day_bounds(ctx.now);
    Ok(ctx.activities.list_between(&ctx.user_id, from, to).await?)
}

fn minutes_by_category(activities: &[Activity]) -> HashMap<ActivityCategory, u32> {
    let mut totals = HashMap::new();
    for a in activities {
        *totals.entry(a.fields.category).or_insert(0) += a.fields.minutes;
    }
    totals
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TodaySummaryInput {}

pub struct TodaySummaryTool;

#[async_trait]
impl Tool for TodaySummaryTool {
    type Input = TodaySummaryInput;

    fn name(&self) -> ToolName {
        ToolName::TodaySummary
    }

    fn description(&self) -> &str {
        "Summarise everything the user logged today, with total minutes per category. No arguments."
    }

    async fn execute(
        &self,
        _input: TodaySummaryInput,
        ctx: &ToolContext,
        sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let activities = today_activities(ctx).await?;
        let total_minutes: u32 = activities.iter().map(|a| a.fields.minutes).sum();

        let list = Block::ActivityList {
            title: "Today".into(),
            activities: activities.clone(),
            total_minutes,
        };
        // 先推送列表，汇总状态随最终结果一起给出
        sink.emit(vec![list.clone()]);

        let summary = if activities.is_empty() {
            "Nothing logged yet today".to_string()
        } else {
            format!("{} activities, {} min today", activities.len(), total_minutes)
        };
        let status = if activities.is_empty() {
            Block::info("Nothing logged yet today.")
        } else {
            Block::info(format!(
                "You logged {} activities for {} minutes today.",
                activities.len(),
                total_minutes
            ))
        };

        let by_category: serde_json::Map<String, serde_json::Value> = minutes_by_category(&activities)
            .into_iter()
            .map(|(c, m)| (c.as_str().to_string(), json!(m)))
            .collect();

        Ok(ToolOutput {
            summary,
            blocks: vec![list, status],
            output_for_model: json!({
                "count": activities.len(),
                "total_minutes": total_minutes,
                "by_category": by_category,
                "activities": activities,
            }),
        })
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SuggestFocusInput {
    /// 用户偏好的专注分类
    #[serde(default)]
    pub preferred: Option<ActivityCategory>,
}

pub struct SuggestFocusTool;

#[async_trait]
impl Tool for SuggestFocusTool {
    type Input = SuggestFocusInput;

    fn name(&self) -> ToolName {
        ToolName::SuggestFocus
    }

    fn description(&self) -> &str {
        "Suggest what the user should focus on next, based on what they logged today. Optional arg: preferred category."
    }

    async fn execute(
        &self,
        input: SuggestFocusInput,
        ctx: &ToolContext,
        _sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let activities = today_activities(ctx).await?;
        let totals = minutes_by_category(&activities);
        let (category, reason) = pick_focus(&totals, input.preferred);

        Ok(ToolOutput {
            summary: format!("Suggested {}", category.as_str()),
            blocks: vec![Block::Suggestion {
                category,
                reason: reason.clone(),
            }],
            output_for_model: json!({
                "category": category,
                "reason": reason,
                "minutes_today": totals.get(&category).copied().unwrap_or(0),
            }),
        })
    }
}

/// 偏好分类未达阈值时选它；否则选今日用时最少的分类（并列取靠前者）
fn pick_focus(
    totals: &HashMap<ActivityCategory, u32>,
    preferred: Option<ActivityCategory>,
) -> (ActivityCategory, String) {
    let minutes = |c: &ActivityCategory| totals.get(c).copied().unwrap_or(0);

    if let Some(p) = preferred {
        let spent = minutes(&p);
        if spent < PREFERRED_THRESHOLD_MINUTES {
            return (
                p,
                format!("It's your focus area and you've spent {spent} min on it today."),
            );
        }
    }

    let mut best = SUGGESTABLE[0];
    for c in SUGGESTABLE.iter().skip(1) {
        if minutes(c) < minutes(&best) {
            best = *c;
        }
    }
    let reason = match minutes(&best) {
        0 => format!("You haven't logged any {} today.", best.as_str()),
        m => format!("{} has the least time today ({m} min).", best.as_str()),
    };
    (best, reason)
}

//! Native pipeline realization of an [`AggregationPlan`].

use super::{AggregationPlan, GroupCount, GroupKey, RowError};
use serde_json::{Value, json};

/// Expression producing the group key for one document as a string.
fn key_expression(key: &GroupKey) -> Value {
    match key {
        GroupKey::Field(path) => json!({ "$toString": format!("${}", path) }),
        GroupKey::EmailDomain(path) => json!({
            "$arrayElemAt": [
                { "$split": [{ "$toString": format!("${}", path) }, "@"] },
                1
            ]
        }),
    }
}

/// Renders the plan as pipeline stages.
///
/// `$toString` of a missing field yields null and `$arrayElemAt` past the end
/// yields missing, so the `$match` drops both before grouping.
pub fn render(plan: &AggregationPlan) -> Vec<Value> {
    let mut stages = vec![
        json!({ "$project": { "_id": 0, "k": key_expression(&plan.key) } }),
        json!({ "$match": { "k": { "$ne": null } } }),
        json!({ "$group": { "_id": "$k", "count": { "$sum": 1 } } }),
        json!({ "$sort": { "count": -1, "_id": 1 } }),
    ];
    if let Some(limit) = plan.limit {
        stages.push(json!({ "$limit": limit }));
    }
    stages
}

/// Reads one `{_id, count}` result document.
pub fn parse_row(index: usize, row: &Value) -> Result<GroupCount, RowError> {
    let group_key = match row.get("_id") {
        Some(Value::String(key)) => key.clone(),
        Some(Value::Null) | None => return Err(RowError::new(index, "missing group key")),
        Some(other) => other.to_string(),
    };
    let count = row
        .get("count")
        .and_then(super::count_value)
        .ok_or_else(|| RowError::new(index, "missing or negative count"))?;

    Ok(GroupCount { group_key, count })
}

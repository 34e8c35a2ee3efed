//! Substrate SQL realization of an [`AggregationPlan`].
//!
//! Collections on the compatibility backend are tables with the document in
//! a `DATA` JSON column. Results come back through the pass-through channel
//! as one JSON string per row under [`PASSTHROUGH_FIELD`].
//!
//! Ties are broken in binary key order whatever the session's `NLS_SORT`,
//! matching the native `$sort`, so a limit cuts the same groups on both paths.

use super::{AggregationPlan, GroupCount, GroupKey, RowError};
use serde_json::Value;

/// Row field carrying the JSON-encoded result document.
pub const PASSTHROUGH_FIELD: &str = "json";

fn key_expression(key: &GroupKey) -> String {
    match key {
        GroupKey::Field(path) => format!("JSON_VALUE(t.DATA, '$.{}')", path),
        GroupKey::EmailDomain(path) => format!(
            "REGEXP_SUBSTR(JSON_VALUE(t.DATA, '$.{}'), '@([^@]*)', 1, 1, NULL, 1)",
            path
        ),
    }
}

/// Renders the plan as a single SQL statement.
///
/// Names are validated by [`AggregationPlan::validate`] before rendering, so
/// they can be interpolated.
pub fn render(plan: &AggregationPlan) -> String {
    let key = key_expression(&plan.key);
    let mut sql = format!(
        "SELECT JSON_OBJECT('groupKey' VALUE g.k, 'count' VALUE g.c) AS \"{field}\" \
         FROM (SELECT {key} AS k, COUNT(*) AS c FROM \"{collection}\" t \
         WHERE {key} IS NOT NULL GROUP BY {key}) g \
         ORDER BY g.c DESC, NLSSORT(g.k, 'NLS_SORT=BINARY') ASC",
        field = PASSTHROUGH_FIELD,
        key = key,
        collection = plan.collection,
    );
    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", limit));
    }
    sql
}

/// Parses one pass-through row.
///
/// The payload is normally a JSON string; an already decoded object is
/// accepted too.
pub fn parse_row(index: usize, row: &Value) -> Result<GroupCount, RowError> {
    let payload = row
        .get(PASSTHROUGH_FIELD)
        .ok_or_else(|| RowError::new(index, format!("missing '{}' field", PASSTHROUGH_FIELD)))?;

    let decoded;
    let document = match payload {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| RowError::new(index, format!("invalid JSON payload: {}", e)))?;
            &decoded
        }
        Value::Object(_) => payload,
        _ => return Err(RowError::new(index, "payload is not a JSON document")),
    };

    let group_key = match document.get("groupKey") {
        Some(Value::String(key)) => key.clone(),
        Some(Value::Null) | None => return Err(RowError::new(index, "missing groupKey")),
        Some(other) => other.to_string(),
    };
    let count = document
        .get("count")
        .and_then(super::count_value)
        .ok_or_else(|| RowError::new(index, "missing or negative count"))?;

    Ok(GroupCount { group_key, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_field_plan() {
        let plan = AggregationPlan::new("registrations", GroupKey::Field("address.city".into()));
        let sql = render(&plan);

        assert!(sql.contains("JSON_VALUE(t.DATA, '$.address.city') AS k"));
        assert!(sql.contains("FROM \"registrations\" t"));
        assert!(sql.contains("IS NOT NULL"));
        assert!(sql.ends_with("ORDER BY g.c DESC, NLSSORT(g.k, 'NLS_SORT=BINARY') ASC"));
        assert!(sql.contains("AS \"json\""));
    }

    #[test]
    fn test_render_email_domain_with_limit() {
        let plan =
            AggregationPlan::new("registrations", GroupKey::EmailDomain("email".into())).with_limit(10);
        let sql = render(&plan);

        assert!(sql.contains("REGEXP_SUBSTR(JSON_VALUE(t.DATA, '$.email'), '@([^@]*)', 1, 1, NULL, 1)"));
        assert!(sql.ends_with("NLSSORT(g.k, 'NLS_SORT=BINARY') ASC FETCH FIRST 10 ROWS ONLY"));
    }

    #[test]
    fn test_parse_string_payload() {
        let row = json!({ "json": "{\"groupKey\":\"example.org\",\"count\":4}" });
        let parsed = parse_row(0, &row).unwrap();
        assert_eq!(parsed.group_key, "example.org");
        assert_eq!(parsed.count, 4);
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        assert!(parse_row(0, &json!({ "json": "{not json" })).is_err());
        assert!(parse_row(1, &json!({ "other": "{}" })).is_err());
        assert!(parse_row(2, &json!({ "json": "{\"count\":1}" })).is_err());

        let err = parse_row(3, &json!({ "json": 7 })).unwrap_err();
        assert_eq!(err.index, 3);
    }
}

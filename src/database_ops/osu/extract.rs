use serde_json::Value;

use crate::database_ops::error::FetchCause;
use crate::database_ops::types::{EnrichmentRecord, RecordKey};

/// One place a logical field may live in a `/beatmaps/{id}` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub path: &'static [&'static str],
    /// Treat a present zero like an absent value and keep looking.
    pub zero_is_missing: bool,
}

impl FieldRule {
    pub const fn at(path: &'static [&'static str]) -> Self {
        Self {
            path,
            zero_is_missing: false,
        }
    }

    pub const fn non_zero(path: &'static [&'static str]) -> Self {
        Self {
            path,
            zero_is_missing: true,
        }
    }
}

/// Ordered rules tried for each enrichment field; first hit wins, otherwise the default.
pub const PLAY_COUNT_RULES: &[FieldRule] = &[
    FieldRule::at(&["playcount"]),
    FieldRule::at(&["statistics", "play_count"]),
];
pub const MAX_COMBO_RULES: &[FieldRule] = &[
    FieldRule::non_zero(&["max_combo"]),
    FieldRule::at(&["statistics", "max_combo"]),
];
pub const MAPPER_RULES: &[FieldRule] = &[FieldRule::at(&["beatmapset", "creator"])];
pub const COVER_RULES: &[FieldRule] = &[FieldRule::at(&["beatmapset", "covers", "card"])];

/// Walk `path` from `root`. Absent keys and nulls along the way yield `Ok(None)`;
/// stepping into something that is not an object is a shape error.
fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<Option<&'a Value>, FetchCause> {
    let mut cur = root;
    for (depth, segment) in path.iter().enumerate() {
        let obj = match cur {
            Value::Object(map) => map,
            Value::Null => return Ok(None),
            other => {
                return Err(FetchCause::Parse(format!(
                    "expected object at '{}', found {}",
                    path[..depth].join("."),
                    kind(other)
                )))
            }
        };
        match obj.get(*segment) {
            Some(Value::Null) | None => return Ok(None),
            Some(next) => cur = next,
        }
    }
    Ok(Some(cur))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn extract_count(root: &Value, rules: &[FieldRule]) -> Result<u64, FetchCause> {
    for rule in rules {
        let Some(v) = lookup(root, rule.path)? else {
            continue;
        };
        let n = v.as_u64().ok_or_else(|| {
            FetchCause::Parse(format!(
                "'{}' is not a non-negative integer ({})",
                rule.path.join("."),
                v
            ))
        })?;
        if n == 0 && rule.zero_is_missing {
            continue;
        }
        return Ok(n);
    }
    Ok(0)
}

pub fn extract_text(root: &Value, rules: &[FieldRule]) -> Result<String, FetchCause> {
    for rule in rules {
        let Some(v) = lookup(root, rule.path)? else {
            continue;
        };
        let s = v.as_str().ok_or_else(|| {
            FetchCause::Parse(format!("'{}' is not a string ({})", rule.path.join("."), kind(v)))
        })?;
        if s.is_empty() && rule.zero_is_missing {
            continue;
        }
        return Ok(s.to_string());
    }
    Ok(String::new())
}

/// Normalize a decoded lookup body into a record. Either every field resolves or the
/// whole payload is rejected.
pub fn record_from_payload(key: RecordKey, payload: &Value) -> Result<EnrichmentRecord, FetchCause> {
    if !payload.is_object() {
        return Err(FetchCause::Parse(format!(
            "expected JSON object, found {}",
            kind(payload)
        )));
    }
    Ok(EnrichmentRecord {
        key,
        play_count: extract_count(payload, PLAY_COUNT_RULES)?,
        max_combo: extract_count(payload, MAX_COMBO_RULES)?,
        mapper_name: extract_text(payload, MAPPER_RULES)?,
        cover_image_url: extract_text(payload, COVER_RULES)?,
    })
}

/// Decode a raw response body and normalize it.
pub fn record_from_body(key: RecordKey, body: &str) -> Result<EnrichmentRecord, FetchCause> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| FetchCause::Parse(format!("invalid JSON: {e}")))?;
    record_from_payload(key, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: RecordKey = RecordKey(2667);

    #[test]
    fn full_payload_uses_primary_fields() {
        let body = json!({
            "id": 2667,
            "playcount": 1200,
            "max_combo": 431,
            "statistics": { "play_count": 1, "max_combo": 2 },
            "beatmapset": {
                "creator": "Ootsuki Kenji",
                "covers": { "card": "https://assets.ppy.sh/beatmaps/521/covers/card.jpg" }
            }
        });
        let rec = record_from_payload(KEY, &body).unwrap();
        assert_eq!(rec.key, KEY);
        assert_eq!(rec.play_count, 1200);
        assert_eq!(rec.max_combo, 431);
        assert_eq!(rec.mapper_name, "Ootsuki Kenji");
        assert_eq!(
            rec.cover_image_url,
            "https://assets.ppy.sh/beatmaps/521/covers/card.jpg"
        );
    }

    #[test]
    fn play_count_falls_back_to_statistics() {
        let body = json!({ "statistics": { "play_count": 77 } });
        assert_eq!(extract_count(&body, PLAY_COUNT_RULES).unwrap(), 77);

        let nulled = json!({ "playcount": null, "statistics": { "play_count": 78 } });
        assert_eq!(extract_count(&nulled, PLAY_COUNT_RULES).unwrap(), 78);
    }

    #[test]
    fn max_combo_falls_back_to_statistics() {
        let body = json!({ "statistics": { "max_combo": 512 } });
        assert_eq!(extract_count(&body, MAX_COMBO_RULES).unwrap(), 512);

        let zeroed = json!({ "max_combo": 0, "statistics": { "max_combo": 513 } });
        assert_eq!(extract_count(&zeroed, MAX_COMBO_RULES).unwrap(), 513);
    }

    #[test]
    fn primary_zero_play_count_is_kept() {
        let body = json!({ "playcount": 0, "statistics": { "play_count": 9 } });
        assert_eq!(extract_count(&body, PLAY_COUNT_RULES).unwrap(), 0);
    }

    #[test]
    fn counts_default_to_zero_when_absent() {
        let body = json!({ "id": 1 });
        assert_eq!(extract_count(&body, PLAY_COUNT_RULES).unwrap(), 0);
        assert_eq!(extract_count(&body, MAX_COMBO_RULES).unwrap(), 0);

        let empty_stats = json!({ "statistics": {} });
        assert_eq!(extract_count(&empty_stats, PLAY_COUNT_RULES).unwrap(), 0);
        assert_eq!(extract_count(&empty_stats, MAX_COMBO_RULES).unwrap(), 0);
    }

    #[test]
    fn text_fields_default_to_empty() {
        let rec = record_from_payload(KEY, &json!({ "playcount": 3 })).unwrap();
        assert_eq!(rec.mapper_name, "");
        assert_eq!(rec.cover_image_url, "");

        let no_covers = json!({ "beatmapset": { "creator": "peppy" } });
        let rec = record_from_payload(KEY, &no_covers).unwrap();
        assert_eq!(rec.mapper_name, "peppy");
        assert_eq!(rec.cover_image_url, "");
    }

    #[test]
    fn wrong_types_are_parse_errors() {
        let bad_count = json!({ "playcount": "lots" });
        assert!(record_from_payload(KEY, &bad_count).unwrap_err().is_parse());

        let negative = json!({ "max_combo": -4 });
        assert!(record_from_payload(KEY, &negative).unwrap_err().is_parse());

        let bad_set = json!({ "beatmapset": "oops" });
        assert!(record_from_payload(KEY, &bad_set).unwrap_err().is_parse());

        let bad_creator = json!({ "beatmapset": { "creator": 5 } });
        assert!(record_from_payload(KEY, &bad_creator).unwrap_err().is_parse());
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert!(record_from_body(KEY, "[1,2,3]").unwrap_err().is_parse());
        assert!(record_from_body(KEY, "<html>bad gateway</html>")
            .unwrap_err()
            .is_parse());
    }

    #[test]
    fn body_round_trip_from_text() {
        let rec = record_from_body(
            KEY,
            r#"{"playcount":50,"max_combo":10,"beatmapset":{"creator":"X"}}"#,
        )
        .unwrap();
        assert_eq!((rec.play_count, rec.max_combo, rec.mapper_name.as_str()), (50, 10, "X"));
    }
}

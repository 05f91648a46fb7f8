//! SARIF 2.1.0 results document, read through borrowed views.
//!
//! The document is kept as the JSON object it was parsed from, so unknown
//! properties, key order and explicit nulls survive a round trip. The views
//! read only the fields fingerprinting needs. A field of the wrong shape reads
//! as absent: one malformed location makes its own result unfingerprintable
//! and leaves the rest of the document alone.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under `partialFingerprints` holding the line hash.
pub const PRIMARY_LOCATION_LINE_HASH: &str = "primaryLocationLineHash";

/// Top-level results document. Anything that is a JSON object parses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SarifLog(Map<String, Value>);

impl SarifLog {
    /// Every entry of `runs`, in document order. A missing or non-array
    /// `runs` has no entries.
    pub fn runs(&self) -> impl Iterator<Item = SarifRun<'_>> {
        array(self.0.get("runs")).iter().map(SarifRun)
    }

    /// The result at `result_index` of run `run_index`, if it is an object.
    pub fn result_mut(
        &mut self,
        run_index: usize,
        result_index: usize,
    ) -> Option<&mut Map<String, Value>> {
        self.0
            .get_mut("runs")?
            .get_mut(run_index)?
            .get_mut("results")?
            .get_mut(result_index)?
            .as_object_mut()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SarifRun<'a>(&'a Value);

impl<'a> SarifRun<'a> {
    /// The run's `artifacts` table, referenced by `artifactLocation.index`.
    pub fn artifacts(&self) -> &'a [Value] {
        array(self.0.get("artifacts"))
    }

    pub fn results(&self) -> impl Iterator<Item = SarifResult<'a>> {
        array(self.0.get("results")).iter().map(SarifResult)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SarifResult<'a>(&'a Value);

impl<'a> SarifResult<'a> {
    /// The first location, used to pick the line whose hash is attached.
    pub fn primary_location(&self) -> Option<SarifLocation<'a>> {
        array(self.0.get("locations")).first().map(SarifLocation)
    }

    /// The recorded `primaryLocationLineHash`, if it is a string.
    pub fn line_hash(&self) -> Option<&'a str> {
        self.0
            .get("partialFingerprints")?
            .get(PRIMARY_LOCATION_LINE_HASH)?
            .as_str()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SarifLocation<'a>(&'a Value);

impl<'a> SarifLocation<'a> {
    pub fn from_value(value: &'a Value) -> Self {
        Self(value)
    }

    /// `physicalLocation.artifactLocation`, when both are objects.
    pub fn artifact_location(&self) -> Option<ArtifactLocation<'a>> {
        self.0
            .get("physicalLocation")?
            .get("artifactLocation")
            .and_then(ArtifactLocation::from_value)
    }

    /// `physicalLocation.region.startLine`, when it is a whole number.
    pub fn start_line(&self) -> Option<i64> {
        let line = self.0.get("physicalLocation")?.get("region")?.get("startLine")?;
        line.as_i64().or_else(|| {
            line.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
    }

    /// The location as written, for log messages.
    pub fn raw(&self) -> &'a Value {
        self.0
    }
}

/// A reference to a file, either by URI or by index into the artifacts table.
///
/// `uri` and `index` are handed out untyped: tools emit all sorts of values
/// here and the resolver decides what is usable.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactLocation<'a>(&'a Map<String, Value>);

impl<'a> ArtifactLocation<'a> {
    pub fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(Self)
    }

    pub fn uri(&self) -> Option<&'a Value> {
        self.0.get("uri")
    }

    pub fn index(&self) -> Option<&'a Value> {
        self.0.get("index")
    }

    /// Human-readable form of the reference for log messages.
    pub fn describe(&self) -> String {
        match (self.uri(), self.index()) {
            (Some(Value::String(uri)), _) if !uri.is_empty() => uri.clone(),
            (Some(uri), None) => uri.to_string(),
            (_, Some(index)) => format!("artifact #{index}"),
            (None, None) => "<no uri>".to_string(),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn array(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "version": "2.1.0",
        "runs": [{
            "tool": {"driver": {"name": "SecurityScanner"}},
            "artifacts": [{"location": {"uri": "src/app.js"}, "length": 42}],
            "results": [{
                "ruleId": "js/sql-injection",
                "message": {"text": "Query built from user input"},
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": {"index": 0},
                        "region": {"startLine": 12, "startColumn": 4}
                    }
                }],
                "partialFingerprints": {"otherHash": "abc"}
            }]
        }]
    }"#;

    fn only_result(log: &SarifLog) -> SarifResult<'_> {
        log.runs().next().unwrap().results().next().unwrap()
    }

    #[test]
    fn reads_location_fields() {
        let log: SarifLog = serde_json::from_str(SAMPLE).unwrap();
        let run = log.runs().next().unwrap();
        assert_eq!(run.artifacts().len(), 1);

        let result = only_result(&log);
        let primary = result.primary_location().unwrap();
        assert_eq!(primary.start_line(), Some(12));
        assert_eq!(
            primary.artifact_location().unwrap().index(),
            Some(&Value::from(0))
        );
        assert_eq!(result.line_hash(), None);
    }

    #[test]
    fn wrong_shapes_read_as_absent() {
        let log: SarifLog = serde_json::from_value(json!({"runs": [{"results": [
            {"locations": null},
            {"locations": [null]},
            {"locations": [{"physicalLocation": "bogus"}]},
            {"locations": [{"physicalLocation": {"artifactLocation": "a.js"}}]},
            {"locations": [{"physicalLocation": {"region": {"startLine": "3"}}}]},
            {"partialFingerprints": {"primaryLocationLineHash": 5}}
        ]}]}))
        .unwrap();
        let results: Vec<_> = log.runs().next().unwrap().results().collect();
        assert_eq!(results.len(), 6);

        assert!(results[0].primary_location().is_none());
        let primary = results[1].primary_location().unwrap();
        assert!(primary.artifact_location().is_none());
        assert!(primary.start_line().is_none());
        assert!(results[2].primary_location().unwrap().artifact_location().is_none());
        assert!(results[3].primary_location().unwrap().artifact_location().is_none());
        assert!(results[4].primary_location().unwrap().start_line().is_none());
        assert_eq!(results[5].line_hash(), None);
    }

    #[test]
    fn whole_float_start_line_is_a_line() {
        let location = json!({"physicalLocation": {"region": {"startLine": 1.0}}});
        assert_eq!(SarifLocation::from_value(&location).start_line(), Some(1));
        let location = json!({"physicalLocation": {"region": {"startLine": 1.5}}});
        assert_eq!(SarifLocation::from_value(&location).start_line(), None);
    }

    #[test]
    fn round_trip_is_byte_for_byte() {
        let text = r#"{"runs":[{"results":[{"partialFingerprints":null,"locations":[{"physicalLocation":{"region":{"startLine":3},"artifactLocation":{"uri":"a.js"}}}],"ruleId":"r"}],"tool":{}}],"version":"2.1.0","$schema":null}"#;
        let log: SarifLog = serde_json::from_str(text).unwrap();
        assert_eq!(serde_json::to_string(&log).unwrap(), text);
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(serde_json::from_str::<SarifLog>("[]").is_err());
        assert!(serde_json::from_str::<SarifLog>("5").is_err());
    }

    #[test]
    fn result_mut_addresses_by_position() {
        let mut log: SarifLog = serde_json::from_str(SAMPLE).unwrap();
        let result = log.result_mut(0, 0).unwrap();
        assert_eq!(result["ruleId"], "js/sql-injection");
        assert!(log.result_mut(0, 1).is_none());
        assert!(log.result_mut(1, 0).is_none());
    }

    #[test]
    fn describe_artifact_location() {
        let describe = |value: Value| ArtifactLocation::from_value(&value).unwrap().describe();
        assert_eq!(describe(json!({"uri": "a.rs"})), "a.rs");
        assert_eq!(describe(json!({"index": 3})), "artifact #3");
        assert_eq!(describe(json!({"uri": "", "index": 3})), "artifact #3");
        assert_eq!(describe(json!({"uri": 7})), "7");
        assert_eq!(describe(json!({})), "<no uri>");
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&falsy), "{falsy}");
        }
        for truthy in [json!(true), json!(5), json!("x"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy}");
        }
    }
}

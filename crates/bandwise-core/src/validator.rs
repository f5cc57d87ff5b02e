//! Validation and normalization of untrusted generator output.
//!
//! The examiner model is asked for a single JSON object, but nothing it
//! returns is trusted: the payload is unwrapped, parsed, and walked field by
//! field. The first missing or malformed required field is reported by name
//! and nothing is repaired.

use serde_json::{Map, Value};

use crate::error::AssessmentError;
use crate::model::{
    AssessmentResult, Band, Criterion, CriterionScore, ErrorAnnotation, TaskType,
    VocabularyHighlights,
};
use crate::traits::strip_code_fence;

type Object = Map<String, Value>;

/// Strip wrapper markers and parse exactly one JSON value.
pub fn parse_payload(raw: &str) -> Result<Value, AssessmentError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(AssessmentError::Parse("empty response".into()));
    }
    serde_json::from_str(body).map_err(|e| AssessmentError::Parse(e.to_string()))
}

/// Validate a raw examiner reply for an essay of the `expected` task type.
pub fn validate_assessment(
    raw: &str,
    expected: TaskType,
) -> Result<AssessmentResult, AssessmentError> {
    let value = parse_payload(raw)?;
    validate_value(&value, expected)
}

/// Validate an already-parsed payload.
pub fn validate_value(value: &Value, expected: TaskType) -> Result<AssessmentResult, AssessmentError> {
    let root = value
        .as_object()
        .ok_or_else(|| AssessmentError::schema("$"))?;

    let task_type = root
        .get("taskType")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<TaskType>().ok())
        .filter(|t| *t == expected)
        .ok_or_else(|| AssessmentError::schema("taskType"))?;

    let word_count = root
        .get("wordCount")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| AssessmentError::schema("wordCount"))?;

    let scores = root
        .get("criteriaScores")
        .and_then(Value::as_object)
        .ok_or_else(|| AssessmentError::schema("criteriaScores"))?;
    let criteria = task_type
        .criteria()
        .into_iter()
        .map(|criterion| criterion_score(scores, criterion, task_type))
        .collect::<Result<Vec<_>, _>>()?;

    let overall_band = root
        .get("overallBand")
        .and_then(scored_band)
        .ok_or_else(|| AssessmentError::schema("overallBand"))?;

    let summary = root
        .get("examinerSummary")
        .or_else(|| root.get("summary"))
        .and_then(non_empty_str)
        .ok_or_else(|| AssessmentError::schema("examinerSummary"))?;

    let priority_improvements = priority_improvements(root)?;

    let model_paragraph = root
        .get("modelParagraph")
        .and_then(non_empty_str)
        .ok_or_else(|| AssessmentError::schema("modelParagraph"))?;

    Ok(AssessmentResult {
        task_type,
        word_count,
        criteria,
        overall_band,
        summary,
        priority_improvements,
        model_paragraph,
        word_count_note: optional_str(root, "wordCountNote"),
        task_specific_feedback: optional_str(root, "taskSpecificFeedback"),
        vocabulary_highlights: root
            .get("vocabularyHighlights")
            .and_then(|v| serde_json::from_value::<VocabularyHighlights>(v.clone()).ok()),
        error_annotations: error_annotations(root),
        original_paragraph: optional_str(root, "originalParagraph"),
        comparative_level: optional_str(root, "comparativeLevel"),
    })
}

fn criterion_score(
    scores: &Object,
    criterion: Criterion,
    task: TaskType,
) -> Result<CriterionScore, AssessmentError> {
    let key = criterion.key(task);
    // Task 1 replies sometimes reuse the task 2 key for the task criterion.
    let entry = scores.get(key).or_else(|| match (criterion, task) {
        (Criterion::Task, TaskType::Task1) => scores.get(Criterion::Task.key(TaskType::Task2)),
        _ => None,
    });
    let entry = entry
        .and_then(Value::as_object)
        .ok_or_else(|| AssessmentError::schema(format!("criteriaScores.{key}")))?;

    let band = entry
        .get("band")
        .and_then(scored_band)
        .ok_or_else(|| AssessmentError::schema(format!("criteriaScores.{key}.band")))?;

    let feedback = entry
        .get("feedback")
        .and_then(non_empty_str)
        .ok_or_else(|| AssessmentError::schema(format!("criteriaScores.{key}.feedback")))?;

    Ok(CriterionScore {
        criterion,
        band,
        feedback,
        label: optional_str(entry, "label"),
        band_rationale: optional_str(entry, "bandRationale"),
    })
}

fn priority_improvements(root: &Object) -> Result<Vec<String>, AssessmentError> {
    let items = root
        .get("priorityImprovements")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| AssessmentError::schema("priorityImprovements"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            non_empty_str(item)
                .ok_or_else(|| AssessmentError::schema(format!("priorityImprovements[{i}]")))
        })
        .collect()
}

fn error_annotations(root: &Object) -> Vec<ErrorAnnotation> {
    let Some(items) = root.get("errorAnnotations").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

fn scored_band(value: &Value) -> Option<Band> {
    value
        .as_f64()
        .and_then(Band::from_f64)
        .filter(|b| b.is_scored())
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_str(object: &Object, key: &str) -> Option<String> {
    object.get(key).and_then(non_empty_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(task: &str, task_key: &str) -> Value {
        json!({
            "taskType": task,
            "wordCount": 271,
            "wordCountNote": "Meets the minimum.",
            "criteriaScores": {
                task_key: {"band": 6, "label": "Task", "feedback": "Position is clear but underdeveloped.", "bandRationale": "Ideas lack extension."},
                "CC": {"band": 6.5, "feedback": "Logical paragraphs; some mechanical linkers."},
                "LR": {"band": 7, "feedback": "Good range: 'exacerbate', 'mitigate'."},
                "GRA": {"band": 6, "feedback": "Frequent article errors."}
            },
            "overallBand": 6.5,
            "examinerSummary": "A competent response held back by thin support.",
            "taskSpecificFeedback": "Answer both parts of the question.",
            "priorityImprovements": ["Extend each main idea with an example.", "Review article use."],
            "vocabularyHighlights": {"effective": ["mitigate"], "problematic": ["do a crime"]},
            "errorAnnotations": [
                {"quote": "the most of people", "type": "Grammar", "issue": "Article misuse", "correction": "most people"},
                {"quote": "x", "type": "Style", "issue": "unknown kind", "correction": "y"}
            ],
            "modelParagraph": "Firstly, free tuition widens access ...",
            "originalParagraph": "First, free university is good ...",
            "comparativeLevel": "Typical of a solid band 6.5 script."
        })
    }

    fn task2_raw() -> String {
        payload("task2", "TR").to_string()
    }

    #[test]
    fn accepts_well_formed_payload() {
        let result = validate_assessment(&task2_raw(), TaskType::Task2).unwrap();
        assert_eq!(result.task_type, TaskType::Task2);
        assert_eq!(result.word_count, 271);
        assert_eq!(result.criteria.len(), 4);
        assert_eq!(result.criteria[0].criterion, Criterion::Task);
        assert_eq!(result.criteria[1].band, Band::from_f64(6.5).unwrap());
        assert_eq!(result.overall_band, Band::from_f64(6.5).unwrap());
        assert_eq!(result.priority_improvements.len(), 2);
        assert_eq!(result.error_annotations.len(), 1);
        assert_eq!(
            result.vocabulary_highlights.unwrap().problematic,
            vec!["do a crime".to_string()]
        );
    }

    #[test]
    fn fenced_and_unfenced_payloads_are_identical() {
        let raw = task2_raw();
        let fenced = format!("```json\n{raw}\n```");
        let bare_fence = format!("```\n{raw}\n```\n");
        let plain = validate_assessment(&raw, TaskType::Task2).unwrap();
        assert_eq!(validate_assessment(&fenced, TaskType::Task2).unwrap(), plain);
        assert_eq!(validate_assessment(&bare_fence, TaskType::Task2).unwrap(), plain);
    }

    #[test]
    fn missing_criterion_key_is_named() {
        for key in ["TR", "CC", "LR", "GRA"] {
            let mut value = payload("task2", "TR");
            value["criteriaScores"].as_object_mut().unwrap().remove(key);
            match validate_value(&value, TaskType::Task2) {
                Err(AssessmentError::Schema { field }) => {
                    assert_eq!(field, format!("criteriaScores.{key}"))
                }
                other => panic!("expected schema error for {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_required_fields_are_named_in_order() {
        let cases = [
            ("taskType", "taskType"),
            ("wordCount", "wordCount"),
            ("criteriaScores", "criteriaScores"),
            ("overallBand", "overallBand"),
            ("examinerSummary", "examinerSummary"),
            ("priorityImprovements", "priorityImprovements"),
            ("modelParagraph", "modelParagraph"),
        ];
        for (remove, expected) in cases {
            let mut value = payload("task2", "TR");
            value.as_object_mut().unwrap().remove(remove);
            match validate_value(&value, TaskType::Task2) {
                Err(AssessmentError::Schema { field }) => assert_eq!(field, expected),
                other => panic!("expected schema error for {remove}, got {other:?}"),
            }
        }
    }

    #[test]
    fn first_failure_wins() {
        let mut value = payload("task2", "TR");
        value["wordCount"] = json!(-3);
        value["modelParagraph"] = json!(null);
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "wordCount"));
    }

    #[test]
    fn rejects_off_scale_bands() {
        let mut value = payload("task2", "TR");
        value["criteriaScores"]["LR"]["band"] = json!(6.25);
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "criteriaScores.LR.band"));

        let mut value = payload("task2", "TR");
        value["criteriaScores"]["CC"]["band"] = json!(3.5);
        assert!(validate_value(&value, TaskType::Task2).is_err());

        let mut value = payload("task2", "TR");
        value["overallBand"] = json!("7");
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "overallBand"));
    }

    #[test]
    fn rejects_empty_feedback_and_improvements() {
        let mut value = payload("task2", "TR");
        value["criteriaScores"]["GRA"]["feedback"] = json!("   ");
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "criteriaScores.GRA.feedback"));

        let mut value = payload("task2", "TR");
        value["priorityImprovements"] = json!([]);
        assert!(validate_value(&value, TaskType::Task2).is_err());

        let mut value = payload("task2", "TR");
        value["priorityImprovements"] = json!(["ok", 3]);
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "priorityImprovements[1]"));
    }

    #[test]
    fn task_type_must_match_request() {
        let err = validate_assessment(&task2_raw(), TaskType::Task1).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "taskType"));
    }

    #[test]
    fn task1_accepts_ta_and_tr_keys() {
        let ta = payload("task1", "TA");
        let result = validate_value(&ta, TaskType::Task1).unwrap();
        assert_eq!(result.criteria[0].band, Band::from_f64(6.0).unwrap());

        let tr = payload("Task 1", "TR");
        assert!(validate_value(&tr, TaskType::Task1).is_ok());
    }

    #[test]
    fn task2_does_not_accept_ta() {
        let value = payload("task2", "TA");
        let err = validate_value(&value, TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "criteriaScores.TR"));
    }

    #[test]
    fn unparsable_output_is_a_parse_error() {
        for raw in ["", "```json\n```", "Here is your feedback: {", "{\"a\": 1} trailing", "{} {}"] {
            assert!(
                matches!(validate_assessment(raw, TaskType::Task2), Err(AssessmentError::Parse(_))),
                "expected parse error for {raw:?}"
            );
        }
    }

    #[test]
    fn non_object_root_is_a_schema_error() {
        let err = validate_assessment("[1, 2, 3]", TaskType::Task2).unwrap_err();
        assert!(matches!(err, AssessmentError::Schema { ref field } if field == "$"));
    }

    #[test]
    fn summary_alias_is_accepted() {
        let mut value = payload("task2", "TR");
        let obj = value.as_object_mut().unwrap();
        let summary = obj.remove("examinerSummary").unwrap();
        obj.insert("summary".into(), summary);
        assert!(validate_value(&value, TaskType::Task2).is_ok());
    }
}

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct TruncatableString {
    value: String,
}

impl From<&str> for TruncatableString {
    fn from(value: &str) -> Self {
        TruncatableString {
            value: value.to_string(),
        }
    }
}

impl From<String> for TruncatableString {
    fn from(value: String) -> Self {
        TruncatableString { value }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum AttributeValue {
    StringValue(TruncatableString),
    IntValue(i64),
    BoolValue(bool),
    DoubleValue(f64),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Attributes {
    pub(crate) attribute_map: BTreeMap<String, AttributeValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Annotation {
    pub(crate) description: TruncatableString,
    pub(crate) attributes: Attributes,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct MessageEvent {
    #[serde(rename = "type")]
    pub(crate) event_type: i32,
    /// Decimal string, as int64 values travel in the agent's JSON encoding.
    pub(crate) id: String,
}

#[derive(TypedBuilder, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeEvent {
    time: String,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<Annotation>,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    message_event: Option<MessageEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeEvents {
    pub(crate) time_event: Vec<TimeEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Link {
    pub(crate) trace_id: String,
    pub(crate) span_id: String,
    #[serde(rename = "type")]
    pub(crate) link_type: i32,
    pub(crate) attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Links {
    pub(crate) link: Vec<Link>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Status {
    pub(crate) code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

#[derive(TypedBuilder, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Span {
    trace_id: String,
    span_id: String,
    #[builder(default)]
    tracestate: BTreeMap<String, String>,
    #[builder(default)]
    parent_span_id: String,
    #[builder(setter(into))]
    name: TruncatableString,
    #[builder(default)]
    kind: i32,
    start_time: String,
    #[builder(setter(strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
    #[builder(default)]
    attributes: Attributes,
    #[builder(default)]
    time_events: TimeEvents,
    #[builder(default)]
    links: Links,
    #[builder(default)]
    status: Status,
    #[builder(default = true)]
    same_process_as_parent_span: bool,
}

#[cfg(test)]
impl Span {
    pub(crate) fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_span() {
        let span = Span::builder()
            .trace_id("afIj9YZoFxzt8MnqsG8NNg==".to_string())
            .span_id("pWpQuQxlPwA=".to_string())
            .name("click")
            .start_time("2019-01-04T00:00:00.000Z".to_string())
            .build();

        assert_eq!(
            serde_json::to_value(&span).unwrap(),
            json!({
                "traceId": "afIj9YZoFxzt8MnqsG8NNg==",
                "spanId": "pWpQuQxlPwA=",
                "tracestate": {},
                "parentSpanId": "",
                "name": {"value": "click"},
                "kind": 0,
                "startTime": "2019-01-04T00:00:00.000Z",
                "attributes": {"attributeMap": {}},
                "timeEvents": {"timeEvent": []},
                "links": {"link": []},
                "status": {"code": 0},
                "sameProcessAsParentSpan": true
            })
        );
    }

    #[test]
    fn test_attribute_values() {
        let mut attributes = Attributes::default();
        attributes.attribute_map.insert(
            "s".to_string(),
            AttributeValue::StringValue("BUTTON".into()),
        );
        attributes
            .attribute_map
            .insert("i".to_string(), AttributeValue::IntValue(200));
        attributes
            .attribute_map
            .insert("b".to_string(), AttributeValue::BoolValue(true));
        attributes
            .attribute_map
            .insert("d".to_string(), AttributeValue::DoubleValue(0.5));

        assert_eq!(
            serde_json::to_value(&attributes).unwrap(),
            json!({"attributeMap": {
                "s": {"stringValue": {"value": "BUTTON"}},
                "i": {"intValue": 200},
                "b": {"boolValue": true},
                "d": {"doubleValue": 0.5}
            }})
        );
    }

    #[test]
    fn test_time_events() {
        let annotation = TimeEvent::builder()
            .time("2019-01-04T00:00:00.010Z".to_string())
            .annotation(Annotation {
                description: "first paint".into(),
                attributes: Attributes::default(),
            })
            .build();
        let message = TimeEvent::builder()
            .time("2019-01-04T00:00:00.020Z".to_string())
            .message_event(MessageEvent {
                event_type: 1,
                id: "22".to_string(),
            })
            .build();

        assert_eq!(
            serde_json::to_value(TimeEvents {
                time_event: vec![annotation, message]
            })
            .unwrap(),
            json!({"timeEvent": [
                {
                    "time": "2019-01-04T00:00:00.010Z",
                    "annotation": {
                        "description": {"value": "first paint"},
                        "attributes": {"attributeMap": {}}
                    }
                },
                {
                    "time": "2019-01-04T00:00:00.020Z",
                    "messageEvent": {"type": 1, "id": "22"}
                }
            ]})
        );
    }
}

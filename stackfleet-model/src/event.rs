//! Inbound invocation payloads and the custom-resource acknowledgement.
//!
//! Two kinds of payload reach the director: CloudFormation custom-resource
//! lifecycle requests and EventBridge scheduled ticks. Anything else is
//! rejected up front instead of being guessed at.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ModelError, Result};
use crate::stack::{Capability, StackParameter, StackRequest};

const STACK_NAME: &str = "StackName";
const TEMPLATE_URL: &str = "TemplateURL";
const NUM_STACKS: &str = "NumStacks";
const KEY_TO_UPDATE: &str = "KeyToUpdate";
const SERVICE_TOKEN: &str = "ServiceToken";
const FUNCTION: &str = "Function";

/// Longest reason string sent back; CloudFormation caps the whole body at 4 KiB.
const MAX_REASON_LEN: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Create => write!(f, "Create"),
            RequestType::Update => write!(f, "Update"),
            RequestType::Delete => write!(f, "Delete"),
        }
    }
}

/// Which job a lifecycle request is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    DeployStacks,
    GenerateIgnition,
}

impl FunctionKind {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw {
            None | Some("DeployCF") => Ok(FunctionKind::DeployStacks),
            Some("GenerateIgnition") => Ok(FunctionKind::GenerateIgnition),
            Some(other) => Err(ModelError::UnknownFunction(other.to_string())),
        }
    }
}

/// A CloudFormation custom-resource request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default, deserialize_with = "text_properties")]
    pub resource_properties: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "optional_text_properties")]
    pub old_resource_properties: Option<BTreeMap<String, String>>,
}

/// Property values as CloudFormation hands them to child stacks: scalars
/// as text, lists of scalars comma-joined like a `CommaDelimitedList`.
fn property_text(key: &str, value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Array(_) | Value::Object(_) => {
                    Err(format!("property {key} holds a nested value"))
                }
                scalar => property_text(key, scalar),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(|items| items.join(",")),
        Value::Object(_) => Err(format!("property {key} is an object")),
    }
}

fn text_map<E: serde::de::Error>(
    raw: BTreeMap<String, Value>,
) -> std::result::Result<BTreeMap<String, String>, E> {
    raw.into_iter()
        .map(|(key, value)| {
            let text = property_text(&key, value).map_err(E::custom)?;
            Ok((key, text))
        })
        .collect()
}

fn text_properties<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    text_map(BTreeMap::<String, Value>::deserialize(deserializer)?)
}

fn optional_text_properties<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<BTreeMap<String, Value>>::deserialize(deserializer)?
        .map(text_map)
        .transpose()
}

impl LifecycleEvent {
    pub fn function(&self) -> Result<FunctionKind> {
        FunctionKind::parse(
            self.resource_properties.get(FUNCTION).map(String::as_str),
        )
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.resource_properties
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Typed view of `ResourceProperties` for the stack fan-out.
    pub fn fan_out_properties(&self) -> Result<FanOutProperties> {
        FanOutProperties::parse(&self.resource_properties)
    }

    /// Typed view of `OldResourceProperties`, present only on updates.
    pub fn previous_fan_out_properties(
        &self,
    ) -> Result<Option<FanOutProperties>> {
        self.old_resource_properties
            .as_ref()
            .map(FanOutProperties::parse)
            .transpose()
    }
}

/// An EventBridge scheduled tick driving the validate pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "detail-type")]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// A lifecycle request too malformed to act on that still names where its
/// acknowledgement goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedLifecycle {
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: Option<String>,
    pub reason: String,
}

impl RejectedLifecycle {
    /// `None` when the payload carries no usable `ResponseURL`.
    fn from_envelope(map: &Map<String, Value>, reason: String) -> Option<Self> {
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            response_url: text("ResponseURL").filter(|url| !url.is_empty())?,
            stack_id: text("StackId").unwrap_or_default(),
            request_id: text("RequestId").unwrap_or_default(),
            logical_resource_id: text("LogicalResourceId").unwrap_or_default(),
            physical_resource_id: text("PhysicalResourceId"),
            reason,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Lifecycle(Box<LifecycleEvent>),
    /// Answered with FAILED without being dispatched.
    Rejected(RejectedLifecycle),
    Scheduled(ScheduledEvent),
}

impl InboundEvent {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(ModelError::UnrecognizedEvent(
                "payload is not a JSON object".into(),
            ));
        };

        if map.contains_key("RequestType") {
            return match serde_json::from_value::<LifecycleEvent>(value.clone()) {
                Ok(event) => Ok(InboundEvent::Lifecycle(Box::new(event))),
                Err(err) => {
                    let reason = ModelError::Json(err).to_string();
                    RejectedLifecycle::from_envelope(map, reason.clone())
                        .map(InboundEvent::Rejected)
                        .ok_or(ModelError::UnrecognizedEvent(reason))
                }
            };
        }

        if map.contains_key("detail-type") || map.contains_key("source") {
            let event: ScheduledEvent = serde_json::from_value(value)?;
            return Ok(InboundEvent::Scheduled(event));
        }

        Err(ModelError::UnrecognizedEvent(
            "expected a CloudFormation RequestType or an EventBridge \
             scheduled event"
                .into(),
        ))
    }
}

/// Fan-out settings parsed out of `ResourceProperties`.
///
/// Every key that is not one of the control keys becomes a template
/// parameter of the child stacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanOutProperties {
    pub stack_name: String,
    pub template_url: String,
    pub num_stacks: Option<u32>,
    pub key_to_update: Option<String>,
    pub parameters: Vec<StackParameter>,
}

impl FanOutProperties {
    pub fn parse(properties: &BTreeMap<String, String>) -> Result<Self> {
        let mut stack_name = None;
        let mut template_url = None;
        let mut num_stacks = None;
        let mut key_to_update = None;
        let mut parameters = Vec::new();

        for (key, value) in properties {
            match key.as_str() {
                STACK_NAME => stack_name = Some(value.clone()),
                TEMPLATE_URL => {
                    url::Url::parse(value).map_err(|err| {
                        ModelError::invalid_property(
                            TEMPLATE_URL,
                            value,
                            err.to_string(),
                        )
                    })?;
                    template_url = Some(value.clone());
                }
                NUM_STACKS => {
                    let parsed = value.trim().parse::<u32>().map_err(|err| {
                        ModelError::invalid_property(
                            NUM_STACKS,
                            value,
                            err.to_string(),
                        )
                    })?;
                    num_stacks = Some(parsed);
                }
                KEY_TO_UPDATE => key_to_update = Some(value.clone()),
                SERVICE_TOKEN | FUNCTION => {}
                _ => parameters.push(StackParameter::new(key, value)),
            }
        }

        Ok(Self {
            stack_name: stack_name
                .filter(|name| !name.is_empty())
                .ok_or(ModelError::MissingProperty(STACK_NAME))?,
            template_url: template_url
                .ok_or(ModelError::MissingProperty(TEMPLATE_URL))?,
            num_stacks,
            key_to_update,
            parameters,
        })
    }

    /// The request every child is derived from; its name is the base name.
    pub fn base_request(&self) -> StackRequest {
        StackRequest {
            stack_name: self.stack_name.clone(),
            template_url: self.template_url.clone(),
            capabilities: Capability::FAN_OUT.to_vec(),
            parameters: self.parameters.clone(),
            disable_rollback: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Body PUT to the pre-signed `ResponseURL`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub no_echo: bool,
    pub data: BTreeMap<String, String>,
}

impl CfnResponse {
    /// Builds the acknowledgement for `event`.
    ///
    /// An existing physical id is echoed back so updates and deletes never
    /// look like a replacement; a fresh resource is named after the log
    /// stream.
    pub fn for_event(
        event: &LifecycleEvent,
        status: ResponseStatus,
        failure: Option<&str>,
        log_stream_name: &str,
    ) -> Self {
        Self {
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            ..Self::answer(
                status,
                failure,
                event.physical_resource_id.as_deref(),
                log_stream_name,
            )
        }
    }

    /// FAILED acknowledgement for a request that could not be parsed.
    pub fn for_rejected(rejected: &RejectedLifecycle, log_stream_name: &str) -> Self {
        Self {
            stack_id: rejected.stack_id.clone(),
            request_id: rejected.request_id.clone(),
            logical_resource_id: rejected.logical_resource_id.clone(),
            ..Self::answer(
                ResponseStatus::Failed,
                Some(&rejected.reason),
                rejected.physical_resource_id.as_deref(),
                log_stream_name,
            )
        }
    }

    fn answer(
        status: ResponseStatus,
        failure: Option<&str>,
        physical_resource_id: Option<&str>,
        log_stream_name: &str,
    ) -> Self {
        let pointer =
            format!("See the details in CloudWatch Log Stream: {log_stream_name}");
        let reason = match failure {
            Some(message) => {
                let mut message = message.to_string();
                if message.len() > MAX_REASON_LEN {
                    let mut cut = MAX_REASON_LEN;
                    while !message.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    message.truncate(cut);
                }
                format!("{message}. {pointer}")
            }
            None => pointer,
        };

        Self {
            status,
            reason,
            physical_resource_id: physical_resource_id
                .unwrap_or(log_stream_name)
                .to_string(),
            stack_id: String::new(),
            request_id: String::new(),
            logical_resource_id: String::new(),
            no_echo: false,
            data: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_payload() -> Value {
        json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation-custom-resource-response.s3.amazonaws.com/x",
            "StackId": "arn:aws:cloudformation:us-east-1:123:stack/parent/guid",
            "RequestId": "req-1",
            "ResourceType": "Custom::DeployStacks",
            "LogicalResourceId": "StudentStacks",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-east-1:123:function:director",
                "Function": "DeployCF",
                "StackName": "ocpws-student",
                "TemplateURL": "https://bucket.s3.amazonaws.com/templates/student.yaml",
                "NumStacks": "3",
                "KeyToUpdate": "StudentNumber",
                "StudentNumber": "0",
                "HostedZoneName": "labs.example.com"
            }
        })
    }

    #[test]
    fn lifecycle_payload_is_recognized() {
        let event = InboundEvent::from_value(create_payload()).unwrap();
        let InboundEvent::Lifecycle(event) = event else {
            panic!("expected lifecycle event");
        };
        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.function().unwrap(), FunctionKind::DeployStacks);

        let props = event.fan_out_properties().unwrap();
        assert_eq!(props.stack_name, "ocpws-student");
        assert_eq!(props.num_stacks, Some(3));
        assert_eq!(props.key_to_update.as_deref(), Some("StudentNumber"));
        let keys: Vec<_> = props
            .parameters
            .iter()
            .map(|p| p.parameter_key.as_str())
            .collect();
        assert_eq!(keys, vec!["HostedZoneName", "StudentNumber"]);
    }

    #[test]
    fn scheduled_payload_is_recognized() {
        let event = InboundEvent::from_value(json!({
            "id": "abc",
            "source": "aws.events",
            "detail-type": "Scheduled Event",
            "resources": ["arn:aws:events:us-east-1:123:rule/ocpws-ValidateEvent"],
            "detail": {}
        }))
        .unwrap();
        assert!(matches!(event, InboundEvent::Scheduled(_)));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        let err = InboundEvent::from_value(json!({"hello": "world"}))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnrecognizedEvent(_)));

        let err = InboundEvent::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ModelError::UnrecognizedEvent(_)));
    }

    #[test]
    fn lifecycle_payload_missing_response_url_cannot_be_answered() {
        let mut payload = create_payload();
        payload.as_object_mut().unwrap().remove("ResponseURL");
        let err = InboundEvent::from_value(payload).unwrap_err();
        assert!(matches!(err, ModelError::UnrecognizedEvent(_)));
    }

    #[test]
    fn list_and_scalar_properties_become_text() {
        let mut payload = create_payload();
        payload["ResourceProperties"]["SubnetIds"] = json!(["subnet-a", "subnet-b"]);
        payload["ResourceProperties"]["NumStacks"] = json!(3);
        payload["ResourceProperties"]["EnableCloud9"] = json!(true);

        let InboundEvent::Lifecycle(event) = InboundEvent::from_value(payload).unwrap() else {
            panic!("expected lifecycle event");
        };
        assert_eq!(event.property("SubnetIds"), Some("subnet-a,subnet-b"));
        assert_eq!(event.property("EnableCloud9"), Some("true"));
        assert_eq!(event.fan_out_properties().unwrap().num_stacks, Some(3));
    }

    #[test]
    fn object_property_rejects_the_request_but_keeps_the_envelope() {
        let mut payload = create_payload();
        payload["ResourceProperties"]["Tags"] = json!({ "team": "labs" });
        payload["PhysicalResourceId"] = json!("existing-id");

        let InboundEvent::Rejected(rejected) = InboundEvent::from_value(payload).unwrap() else {
            panic!("expected a rejected request");
        };
        assert_eq!(rejected.request_id, "req-1");
        assert_eq!(rejected.logical_resource_id, "StudentStacks");
        assert!(rejected.reason.contains("Tags"), "{}", rejected.reason);

        let response = CfnResponse::for_rejected(&rejected, "stream-1");
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.physical_resource_id, "existing-id");
        assert_eq!(response.stack_id, "arn:aws:cloudformation:us-east-1:123:stack/parent/guid");
        assert!(response.reason.contains("Tags"));
    }

    #[test]
    fn unknown_request_type_is_rejected_with_a_response() {
        let mut payload = create_payload();
        payload["RequestType"] = json!("Replace");
        assert!(matches!(
            InboundEvent::from_value(payload).unwrap(),
            InboundEvent::Rejected(_)
        ));
    }

    #[test]
    fn non_numeric_stack_count_is_invalid() {
        let mut props = BTreeMap::new();
        props.insert("StackName".to_string(), "s".to_string());
        props.insert(
            "TemplateURL".to_string(),
            "https://bucket.s3.amazonaws.com/t.yaml".to_string(),
        );
        props.insert("NumStacks".to_string(), "three".to_string());
        let err = FanOutProperties::parse(&props).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidProperty { ref key, .. } if key == "NumStacks"
        ));
    }

    #[test]
    fn missing_stack_name_is_reported() {
        let mut props = BTreeMap::new();
        props.insert(
            "TemplateURL".to_string(),
            "https://bucket.s3.amazonaws.com/t.yaml".to_string(),
        );
        let err = FanOutProperties::parse(&props).unwrap_err();
        assert!(matches!(err, ModelError::MissingProperty("StackName")));
    }

    #[test]
    fn unknown_function_is_rejected() {
        assert!(matches!(
            FunctionKind::parse(Some("Teleport")),
            Err(ModelError::UnknownFunction(_))
        ));
        assert_eq!(
            FunctionKind::parse(Some("GenerateIgnition")).unwrap(),
            FunctionKind::GenerateIgnition
        );
    }

    #[test]
    fn response_echoes_existing_physical_id() {
        let mut event: LifecycleEvent =
            serde_json::from_value(create_payload()).unwrap();
        event.physical_resource_id = Some("existing-id".into());
        let response = CfnResponse::for_event(
            &event,
            ResponseStatus::Failed,
            Some("boom"),
            "2024/01/01/[$LATEST]abc",
        );
        assert_eq!(response.physical_resource_id, "existing-id");
        assert!(response.reason.starts_with("boom. "));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["Status"], "FAILED");
        assert_eq!(json["LogicalResourceId"], "StudentStacks");
        assert_eq!(json["Data"], json!({}));
    }

    #[test]
    fn response_falls_back_to_log_stream_for_new_resources() {
        let event: LifecycleEvent =
            serde_json::from_value(create_payload()).unwrap();
        let response = CfnResponse::for_event(
            &event,
            ResponseStatus::Success,
            None,
            "stream-1",
        );
        assert_eq!(response.physical_resource_id, "stream-1");
        assert_eq!(response.status, ResponseStatus::Success);
    }
}

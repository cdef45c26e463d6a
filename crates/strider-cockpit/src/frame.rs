//! JSON frame protocol between operator front-ends and the [`RobotService`].
//!
//! Upstream frames look like `{"topic": "/command", "msg": {...}}`.  Every
//! upstream frame gets exactly one [`Reply`]:
//!
//! | Topic | `msg` | Success status |
//! |---|---|---|
//! | `/command` | `{kx, ky}` or `{angle, intensity}` | `queued` / `cached` |
//! | `/head_control` | `{qx, qy}` | `success` |
//! | `/action` | `{action}` | `queued` |
//! | `/stop` | – | `queued` |
//! | `/autonomous_mode` | `{enabled}` | `ok` |
//! | `/status` | – | `ok` |
//! | `/sensor_data` | – | `ok` |
//!
//! A full queue or an exhausted rate limit is `busy`; anything else that goes
//! wrong is `error` with the [`StriderError::kind`] in `data.kind`.

use governor::DefaultDirectRateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strider_middleware::Topic;
use strider_runtime::RobotService;
use strider_types::{Event, HeadVector, MoveAck, MoveRequest, StriderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Queued,
    Cached,
    Success,
    Ok,
    Busy,
    Error,
}

/// Answer to one upstream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub topic: String,
    pub status: ReplyStatus,
    pub message: String,
    pub data: Value,
}

impl Reply {
    fn new(topic: &str, status: ReplyStatus, message: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.to_string(),
            status,
            message: message.into(),
            data,
        }
    }

    fn failure(topic: &str, err: &StriderError) -> Self {
        let status = match err {
            StriderError::QueueFull => ReplyStatus::Busy,
            _ => ReplyStatus::Error,
        };
        Self::new(topic, status, err.to_string(), json!({ "kind": err.kind() }))
    }
}

/// Bus event forwarded downstream to every client.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame<'a> {
    pub topic: String,
    pub event: &'a Event,
}

impl<'a> EventFrame<'a> {
    pub fn new(topic: Topic, event: &'a Event) -> Self {
        Self {
            topic: format!("/events/{}", topic.as_str()),
            event,
        }
    }
}

#[derive(Deserialize)]
struct Frame {
    topic: String,
    #[serde(default)]
    msg: Value,
}

#[derive(Deserialize, Default)]
struct HeadMsg {
    #[serde(default)]
    qx: f32,
    #[serde(default)]
    qy: f32,
}

#[derive(Deserialize, Default)]
struct ActionMsg {
    #[serde(default)]
    action: String,
}

#[derive(Deserialize, Default)]
struct AutonomyMsg {
    #[serde(default)]
    enabled: bool,
}

fn parse_msg<T: for<'de> Deserialize<'de> + Default>(msg: Value) -> Result<T, StriderError> {
    if msg.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(msg).map_err(|e| StriderError::InvalidIntentKind(e.to_string()))
}

/// Translates frames of one client into service calls.
pub struct FrameHandler {
    service: RobotService,
    limiter: DefaultDirectRateLimiter,
}

impl FrameHandler {
    pub fn new(service: RobotService, limiter: DefaultDirectRateLimiter) -> Self {
        Self { service, limiter }
    }

    /// Handle one raw text frame.
    pub async fn handle(&self, text: &str) -> Reply {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                return Reply::new(
                    "",
                    ReplyStatus::Error,
                    format!("malformed frame: {e}"),
                    json!({ "kind": "malformed_frame" }),
                );
            }
        };
        if self.limiter.check().is_err() {
            return Reply::new(
                &frame.topic,
                ReplyStatus::Busy,
                "rate limit exceeded",
                json!({ "kind": "rate_limited" }),
            );
        }

        let topic = frame.topic.as_str();
        match self.dispatch(topic, frame.msg).await {
            Ok(reply) => reply,
            Err(err) => Reply::failure(topic, &err),
        }
    }

    async fn dispatch(&self, topic: &str, msg: Value) -> Result<Reply, StriderError> {
        let reply = match topic {
            "/command" => match self.service.submit_move(parse_msg::<MoveRequest>(msg)?)? {
                MoveAck::Queued { directive } => Reply::new(
                    topic,
                    ReplyStatus::Queued,
                    directive.to_string(),
                    json!(directive),
                ),
                MoveAck::Cached => {
                    Reply::new(topic, ReplyStatus::Cached, "debounced", Value::Null)
                }
            },
            "/head_control" => {
                let head: HeadMsg = parse_msg(msg)?;
                self.service.submit_head(HeadVector {
                    qx: head.qx,
                    qy: head.qy,
                })?;
                Reply::new(topic, ReplyStatus::Success, "head move queued", Value::Null)
            }
            "/action" => {
                let action: ActionMsg = parse_msg(msg)?;
                if action.action.is_empty() {
                    return Err(StriderError::UnknownAction(String::new()));
                }
                let kind = self.service.submit_action(&action.action)?;
                Reply::new(
                    topic,
                    ReplyStatus::Queued,
                    format!("action {kind} queued"),
                    json!({ "action": kind }),
                )
            }
            "/stop" => {
                self.service.submit_stop()?;
                Reply::new(topic, ReplyStatus::Queued, "stop queued", Value::Null)
            }
            "/autonomous_mode" => {
                let request: AutonomyMsg = parse_msg(msg)?;
                let enabled = self.service.set_autonomous(request.enabled);
                let message = if enabled {
                    "autonomous mode on"
                } else {
                    "autonomous mode off"
                };
                Reply::new(topic, ReplyStatus::Ok, message, json!({ "enabled": enabled }))
            }
            "/status" => {
                let status = self.service.status();
                Reply::new(topic, ReplyStatus::Ok, status.mode.to_string(), json!(status))
            }
            "/sensor_data" => {
                let snapshot = self.service.sensor_snapshot().await;
                let message = match snapshot.distance_cm {
                    Some(cm) => format!("{cm:.1} cm"),
                    None => "no reading".to_string(),
                };
                Reply::new(
                    topic,
                    ReplyStatus::Ok,
                    message,
                    json!({ "distance": snapshot.distance_cm }),
                )
            }
            other => Reply::new(
                other,
                ReplyStatus::Error,
                format!("unknown topic '{other}'"),
                json!({ "kind": "unknown_topic" }),
            ),
        };
        Ok(reply)
    }
}

// Moderation: the pipeline that turns an inbound chat message into a verdict
// and, for toxic messages, a moderator alert.

pub mod alert;
pub mod pipeline;

pub use alert::{format_alert, AlertSink, TelegramAlertSink};
pub use pipeline::{Message, ModerationPipeline, PipelineConfig, PipelineOutcome};

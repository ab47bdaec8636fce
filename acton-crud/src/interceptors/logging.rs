//! Call logging

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::Capabilities;
use crate::config::LoggingConfig;
use crate::entity::document::to_document;
use crate::entity::{Entity, Presentation};
use crate::error::Result;
use crate::pipeline::{
    CallContext, Interceptor, Next, Operation, OperationMarkers, Output, Record, LOGGING_ORDER,
};

/// Logs the start, end and failure of every call
///
/// Failures are logged and returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    activate_all: bool,
}

impl LoggingInterceptor {
    /// Log loggable services and calls whose marker forces logging
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from configuration
    pub fn with_config(config: &LoggingConfig) -> Self {
        Self {
            activate_all: config.activate_logging,
        }
    }
}

fn render_arguments(arguments: &[(&'static str, Value)]) -> String {
    arguments
        .iter()
        .map(|(_, value)| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_output<E: Presentation, D: Presentation>(output: &Output<E, D>) -> String {
    let rendered = match output {
        Output::Record(record) => record.to_document(),
        Output::Page(page) => to_document(page),
        Output::List(records) => records
            .iter()
            .map(Record::to_document)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Output::Empty => return "()".to_string(),
    };
    rendered.map_or_else(|e| format!("<unserializable: {}>", e), |value| value.to_string())
}

#[async_trait]
impl<E: Entity, D: Presentation> Interceptor<E, D> for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "Logging"
    }

    fn order(&self) -> i32 {
        LOGGING_ORDER
    }

    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool {
        markers.logging.as_ref().is_some_and(|marker| {
            capabilities.loggable || marker.activate_logging || self.activate_all
        })
    }

    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        let message = ctx
            .markers
            .logging
            .as_ref()
            .map_or("", |marker| marker.message.as_str());
        let signature = ctx.signature();
        let arguments = operation
            .arguments()
            .map_or_else(|e| format!("<unserializable: {}>", e), |a| render_arguments(&a));

        tracing::debug!(
            "Method call: {}, with argument: {}. {}",
            signature,
            arguments,
            message
        );

        match next.run(operation).await {
            Ok(output) => {
                tracing::debug!(
                    "Method finish: {}, with return: {}. {}",
                    signature,
                    render_output(&output),
                    message
                );
                Ok(output)
            }
            Err(e) => {
                tracing::error!(
                    "Method finish: {}, with exception: {}. {}",
                    signature,
                    e,
                    message
                );
                Err(e)
            }
        }
    }
}

//! Calculate Cube Workflow
//!
//! Squares the input, multiplies by the input again and stores the result
//! under the instance id. Special inputs exercise the engine:
//!
//! | Value      | Behavior                                                    |
//! |------------|-------------------------------------------------------------|
//! | `0`        | "calculate square" fails with a retryable error             |
//! | negative   | "calculate square" fails with a non-retryable error         |
//! | `42`       | the body pauses its own instance before computing the cube  |
//! | `43`       | the body waits for a `weather` event whose payload must be 143 |

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use super::store::NumberStore;
use crate::execution::{BoxError, NonRetryableError, StepError, WaitOptions, WorkflowStep};
use crate::workflow::{Registry, StepConfig, Workflow, WorkflowDuration, WorkflowEvent};

/// Input value that makes the body pause itself.
pub const PAUSE_VALUE: i64 = 42;

/// Input value that makes the body wait for a [`WEATHER_EVENT`].
pub const WEATHER_VALUE: i64 = 43;

/// Event type the body waits for when started with [`WEATHER_VALUE`].
pub const WEATHER_EVENT: &str = "weather";

const EXPECTED_WEATHER: i64 = 143;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeParams {
    pub value: i64,
}

/// The demo workflow body and its adapters.
pub struct CubeWorkflow {
    number_store: Arc<dyn NumberStore>,
    registry: Arc<Registry>,
}

impl CubeWorkflow {
    pub fn new(number_store: Arc<dyn NumberStore>, registry: Arc<Registry>) -> Self {
        Self {
            number_store,
            registry,
        }
    }
}

#[async_trait]
impl Workflow for CubeWorkflow {
    type Params = CubeParams;

    async fn run(&self, event: WorkflowEvent<CubeParams>, step: WorkflowStep) -> Result<(), StepError> {
        let value = event.payload.value;
        let instance_id = event.instance_id.as_str();

        let square_config = StepConfig::new().with_retries(3, WorkflowDuration::seconds(1));
        let square = step
            .run_with_config("calculate square", square_config, move || async move {
                if value == 0 {
                    return Err::<i64, BoxError>(
                        "Value cannot be 0 - this is a retryable error".into(),
                    );
                }
                if value < 0 {
                    let error = NonRetryableError::new(
                        "Value cannot be negative - this is a non-retryable error",
                    )
                    .with_name("the-name");
                    return Err(Box::new(error) as BoxError);
                }
                value
                    .checked_mul(value)
                    .ok_or_else(|| Box::new(NonRetryableError::new("Value is too large")) as BoxError)
            })
            .await?;

        if value == PAUSE_VALUE {
            let registry = &self.registry;
            step.run("pause this workflow", move || async move {
                registry.get(instance_id)?.pause();
                Ok::<_, BoxError>(())
            })
            .await?;
        }

        if value == WEATHER_VALUE {
            let options = WaitOptions::new(WEATHER_EVENT).with_timeout(WorkflowDuration::seconds(10));
            let weather = step
                .wait_for_event_as::<i64>("Wait for the sun to shine", options)
                .await?;
            debug!("Instance '{}' received weather {}", instance_id, weather.payload);
            if weather.payload != EXPECTED_WEATHER {
                return Err(StepError::failed(format!(
                    "Weather is not {}",
                    EXPECTED_WEATHER
                )));
            }
        }

        let cube = step
            .run("calculate cube", move || async move {
                square
                    .checked_mul(value)
                    .ok_or_else(|| Box::new(NonRetryableError::new("Value is too large")) as BoxError)
            })
            .await?;

        let store = &self.number_store;
        step.run("store cube", move || async move {
            store.put_number(instance_id, cube).await
        })
        .await
    }
}

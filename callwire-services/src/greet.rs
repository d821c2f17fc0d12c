//! Greeting service: one method per call pattern, plus a slow unary call
//! that honours the caller's deadline.

use std::sync::Arc;
use std::time::Duration;

use callwire::{CallContext, Receiver, RpcRouter, Sender, Status};
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "greet.GreetService";

pub const GREET: &str = "/greet.GreetService/Greet";
pub const GREET_MANY_TIMES: &str = "/greet.GreetService/GreetManyTimes";
pub const LONG_GREET: &str = "/greet.GreetService/LongGreet";
pub const GREET_EVERYONE: &str = "/greet.GreetService/GreetEveryone";
pub const GREET_WITH_DEADLINE: &str = "/greet.GreetService/GreetWithDeadline";

/// Upper bound (exclusive) of the `GreetManyTimes` counter.
pub const DEFAULT_REPETITIONS: u64 = 10_000_000;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub first_name: String,
    #[prost(string, tag = "2")]
    pub last_name: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetManyTimesRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetManyTimesResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongGreetRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongGreetResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetEveryoneRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetEveryoneResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetWithDeadlineRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetWithDeadlineResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

fn first_name(greeting: Option<Greeting>) -> String {
    greeting.unwrap_or_default().first_name
}

#[derive(Clone, Debug)]
pub struct GreetService {
    repetitions: u64,
    deadline_steps: u32,
    step_delay: Duration,
}

impl Default for GreetService {
    fn default() -> Self {
        Self {
            repetitions: DEFAULT_REPETITIONS,
            deadline_steps: 3,
            step_delay: Duration::from_secs(1),
        }
    }
}

impl GreetService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GreetManyTimes` emits greetings numbered `1..repetitions`.
    pub fn with_repetitions(mut self, repetitions: u64) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Simulated work of `GreetWithDeadline`.
    pub fn with_deadline_steps(mut self, steps: u32, delay: Duration) -> Self {
        self.deadline_steps = steps;
        self.step_delay = delay;
        self
    }

    pub fn router(self) -> RpcRouter {
        let service = Arc::new(self);
        let many_times = service.clone();
        let with_deadline = service;

        RpcRouter::new()
            .unary(SERVICE, "Greet", greet)
            .server_stream(
                SERVICE,
                "GreetManyTimes",
                move |ctx: CallContext, req: GreetManyTimesRequest, tx: Sender<GreetManyTimesResponse>| {
                    many_times.clone().greet_many_times(ctx, req, tx)
                },
            )
            .client_stream(SERVICE, "LongGreet", long_greet)
            .bidi_stream(SERVICE, "GreetEveryone", greet_everyone)
            .unary(
                SERVICE,
                "GreetWithDeadline",
                move |ctx: CallContext, req: GreetWithDeadlineRequest| {
                    with_deadline.clone().greet_with_deadline(ctx, req)
                },
            )
    }

    async fn greet_many_times(
        self: Arc<Self>,
        _ctx: CallContext,
        req: GreetManyTimesRequest,
        tx: Sender<GreetManyTimesResponse>,
    ) -> Result<(), Status> {
        let first_name = first_name(req.greeting);
        tracing::info!(%first_name, repetitions = self.repetitions, "greeting many times");

        for i in 1..self.repetitions {
            tx.send(GreetManyTimesResponse {
                result: format!("Hello {first_name} number {i}"),
            })
            .await?;
        }
        Ok(())
    }

    async fn greet_with_deadline(
        self: Arc<Self>,
        ctx: CallContext,
        req: GreetWithDeadlineRequest,
    ) -> Result<GreetWithDeadlineResponse, Status> {
        for step in 0..self.deadline_steps {
            if let Err(status) = ctx.check() {
                tracing::info!(step, code = %status.code(), "greeting abandoned");
                return Err(status);
            }
            ctx.sleep(self.step_delay).await?;
        }

        Ok(GreetWithDeadlineResponse {
            result: format!("Hello {} from server", first_name(req.greeting)),
        })
    }
}

async fn greet(_ctx: CallContext, req: GreetRequest) -> Result<GreetResponse, Status> {
    Ok(GreetResponse {
        result: format!("Hello {} from server", first_name(req.greeting)),
    })
}

async fn long_greet(
    _ctx: CallContext,
    mut rx: Receiver<LongGreetRequest>,
) -> Result<LongGreetResponse, Status> {
    let mut result = String::new();
    while let Some(req) = rx.recv().await? {
        result.push_str(&format!("Hello {}!\n ", first_name(req.greeting)));
    }
    Ok(LongGreetResponse { result })
}

async fn greet_everyone(
    _ctx: CallContext,
    mut rx: Receiver<GreetEveryoneRequest>,
    tx: Sender<GreetEveryoneResponse>,
) -> Result<(), Status> {
    while let Some(req) = rx.recv().await? {
        tx.send(GreetEveryoneResponse {
            result: format!("Hello {}! ", first_name(req.greeting)),
        })
        .await?;
    }
    Ok(())
}

//! Ordered request pipeline
//!
//! The gateway applies a fixed list of stages to every request. Stages run
//! in declaration order; any stage may end the request early, in which case
//! no later stage and no handler runs. After the response is known, every
//! stage that was entered gets a `complete` callback in reverse order, so
//! outer stages (access log, CORS) observe the final status and headers.

use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header::HeaderMap, StatusCode},
    Error, HttpMessage, HttpResponse, ResponseError,
};
use async_trait::async_trait;
use futures_util::future::LocalBoxFuture;

use crate::context::RequestContext;
use crate::error::GatewayError;

/// What a stage wants to happen next
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage
    Continue,
    /// Answer now with this response (not a rejection)
    Respond(HttpResponse),
}

/// One step of the pipeline
///
/// `process` returning `Err` short-circuits with the error's response.
#[async_trait(?Send)]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// When true the stage is skipped entirely for this request
    fn bypass(&self, _ctx: &RequestContext) -> bool {
        false
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<Flow, GatewayError>;

    /// Called once the final response status is known
    fn complete(&self, _ctx: &RequestContext, _status: StatusCode, _headers: &mut HeaderMap) {}
}

/// Result of running the request half of the pipeline
#[derive(Debug)]
pub struct Passage {
    /// Indexes of the stages that were entered, in order
    pub entered: Vec<usize>,
    pub outcome: Result<Flow, GatewayError>,
}

/// Pipeline orchestrator and actix middleware factory
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; order of calls is execution order
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run stages in order until one short-circuits or all continue
    pub async fn enter(&self, ctx: &mut RequestContext) -> Passage {
        let mut entered = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.bypass(ctx) {
                continue;
            }
            entered.push(index);

            match stage.process(ctx).await {
                Ok(Flow::Continue) => {}
                outcome => {
                    tracing::debug!(
                        stage = stage.name(),
                        path = %ctx.path,
                        "Pipeline short-circuited"
                    );
                    return Passage { entered, outcome };
                }
            }
        }

        Passage {
            entered,
            outcome: Ok(Flow::Continue),
        }
    }

    /// Run completion callbacks of entered stages, innermost first
    pub fn finish(
        &self,
        ctx: &RequestContext,
        entered: &[usize],
        status: StatusCode,
        headers: &mut HeaderMap,
    ) {
        for &index in entered.iter().rev() {
            self.stages[index].complete(ctx, status, headers);
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Pipeline
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PipelineService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PipelineService {
            service: Rc::new(service),
            pipeline: Rc::new(self.clone()),
        }))
    }
}

pub struct PipelineService<S> {
    service: Rc<S>,
    pipeline: Rc<Pipeline>,
}

impl<S, B> Service<ServiceRequest> for PipelineService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let pipeline = self.pipeline.clone();

        Box::pin(async move {
            let mut ctx = RequestContext::from_service_request(&req);
            let Passage { entered, outcome } = pipeline.enter(&mut ctx).await;

            let mut res = match outcome {
                Ok(Flow::Continue) => {
                    req.extensions_mut().insert(ctx.clone());
                    // The router needs sole ownership of the request head, so
                    // nothing may hold a clone of it across this call
                    service.call(req).await?.map_into_left_body()
                }
                Ok(Flow::Respond(response)) => req.into_response(response).map_into_right_body(),
                Err(err) => req.into_response(err.error_response()).map_into_right_body(),
            };

            let status = res.status();
            pipeline.finish(&ctx, &entered, status, res.headers_mut());

            Ok(res)
        })
    }
}

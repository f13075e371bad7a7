//! Runtime pieces of the outdial server: bootstrap wiring, the call
//! orchestrator and its status reconciler, the dispatch loop, and the HTTP
//! surfaces (provider webhooks and health). The `outdial-server` binary and
//! the operator CLI both build on this crate.

pub mod bootstrap;
pub mod dispatcher;
pub mod health;
pub mod orchestrator;
pub mod reconciler;
pub mod webhooks;

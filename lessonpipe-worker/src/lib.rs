//! lessonpipe-worker - Pipeline background services
//!
//! Hosts the two long-running poll loops of the lesson pipeline:
//! - the class monitor, which watches the operational store for ended
//!   classes and dispatches each exactly once to the external workflow;
//! - the transcript worker, which claims ready transcript artifacts from
//!   the analytical store and turns them into exercise sets.
//!
//! The exercise engine lives here too; it is a deterministic function of
//! the transcript, the artifact context, and the (optional) LLM and
//! translator collaborators.

pub mod engine;
pub mod monitor;
pub mod worker;

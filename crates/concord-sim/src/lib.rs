//! Simulated native audio engine for the concord shim.
//!
//! `concord-sim` implements the native engine traits of `concord-core`
//! in memory, with the implementation defects of real engines switchable
//! through a [`QuirkProfile`](concord_config::QuirkProfile). It exists so the
//! shim can be driven end to end without an audio device.
//!
//! ## What is simulated
//!
//! - **Graph**: nodes live in a per-context arena. Edges name their
//!   destination by index, so cyclic graphs need no reference cycles.
//! - **Signal**: one DC value per node per frame. Sources emit their
//!   `offset`, gains scale, everything else sums its inputs. Nodes on a cycle
//!   output silence.
//! - **Time**: a frame clock advanced by [`SimContext::pull`] (live) or by
//!   offline rendering.
//! - **Events**: `statechange`, `complete` and source `ended` events are
//!   dispatched with the native object as target.
//! - **Quirks**: broken selective disconnect, wrong error kind on
//!   cross-context param connects, missing `cancel_and_hold_at_time`,
//!   unvalidated exponential ramps and frequency-response arrays, and a
//!   processor input limit.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use concord_config::ShimConfig;
//! use concord_core::Context;
//! use concord_sim::SimBackend;
//!
//! let backend = SimBackend::builtin("legacy-webkit").unwrap().into_ref();
//! let context = Context::new_live(&backend, &ShimConfig::default()).await?;
//! let gain = context.create_gain()?;
//! gain.connect(&context.destination(), 0, 0)?;
//! ```

mod backend;
mod biquad;
mod context;
mod listeners;
mod node;
mod param;
mod render;

pub use backend::{DEFAULT_SAMPLE_RATE, SimBackend};
pub use context::{MAX_CHANNELS, SimContext, SimEdge};
pub use node::SimNode;
pub use param::SimParam;

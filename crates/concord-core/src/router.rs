//! Connection router.
//!
//! Every `connect`/`disconnect` issued through a wrapper lands here. The
//! router validates against the context's [`WrapperGraph`], then sends the
//! change to one of two places:
//!
//! - **live** contexts: straight to the native graph, routing into the
//!   inputs of a composite native node where one stands in for the
//!   destination;
//! - **offline** contexts: to the shadow graph of [`Renderer`]s, which is
//!   only turned into native edges when the context renders.
//!
//! All checks run before anything is mutated, so a failed call leaves both
//! the wrapper graph and the native side as they were.

use crate::error::{AudioError, Result, relabel_invalid_state};
use crate::graph::{Connection, ConnectionFilter, ConnectionTarget};
use crate::identity::stores;
use crate::native::NativeNodeRef;
use crate::node::AudioNode;
use crate::param::AudioParam;
use crate::renderer::Renderer;

/// Which outgoing connections a disconnect removes.
#[derive(Debug, Clone, Copy)]
pub enum DisconnectTarget<'a> {
    /// Every outgoing connection.
    All,
    /// Every connection leaving one output.
    Output(u32),
    /// Connections to a node, optionally narrowed to one output and input.
    Node {
        /// Destination node.
        destination: &'a AudioNode,
        /// Only connections from this output.
        output: Option<u32>,
        /// Only connections into this input.
        input: Option<u32>,
    },
    /// Connections to a param, optionally narrowed to one output.
    Param {
        /// Destination param.
        destination: &'a AudioParam,
        /// Only connections from this output.
        output: Option<u32>,
    },
}

impl<'a> DisconnectTarget<'a> {
    /// Every connection to `destination`.
    pub fn node(destination: &'a AudioNode) -> Self {
        Self::Node {
            destination,
            output: None,
            input: None,
        }
    }

    /// Connections from `output` to `destination`.
    pub fn node_output(destination: &'a AudioNode, output: u32) -> Self {
        Self::Node {
            destination,
            output: Some(output),
            input: None,
        }
    }

    /// The connection from `output` to `input` of `destination`.
    pub fn node_input(destination: &'a AudioNode, output: u32, input: u32) -> Self {
        Self::Node {
            destination,
            output: Some(output),
            input: Some(input),
        }
    }

    /// Every connection to `destination`.
    pub fn param(destination: &'a AudioParam) -> Self {
        Self::Param {
            destination,
            output: None,
        }
    }

    /// Connections from `output` to `destination`.
    pub fn param_output(destination: &'a AudioParam, output: u32) -> Self {
        Self::Param {
            destination,
            output: Some(output),
        }
    }

    fn output(&self) -> Option<u32> {
        match *self {
            Self::All => None,
            Self::Output(output) => Some(output),
            Self::Node { output, .. } | Self::Param { output, .. } => output,
        }
    }

    /// True for targets that name a destination. Those must match at least
    /// one recorded connection.
    fn names_destination(&self) -> bool {
        matches!(self, Self::Node { .. } | Self::Param { .. })
    }

    fn filter(&self) -> ConnectionFilter {
        match *self {
            Self::All => ConnectionFilter::All,
            Self::Output(output) => ConnectionFilter::Output(output),
            Self::Node {
                destination,
                output,
                input,
            } => ConnectionFilter::Node {
                id: destination.id(),
                output,
                input,
            },
            Self::Param {
                destination,
                output,
            } => ConnectionFilter::Param {
                id: destination.id(),
                output,
            },
        }
    }
}

fn check_output(node: &AudioNode, output: u32) -> Result<()> {
    let outputs = node.number_of_outputs();
    if output >= outputs {
        return Err(AudioError::index_size(format!(
            "output {output} out of range for {} with {outputs} outputs",
            node.kind()
        )));
    }
    Ok(())
}

fn check_input(node: &AudioNode, input: u32) -> Result<()> {
    let inputs = node.number_of_inputs();
    if input >= inputs {
        return Err(AudioError::index_size(format!(
            "input {input} out of range for {} with {inputs} inputs",
            node.kind()
        )));
    }
    Ok(())
}

/// Resolves `input` of `native` to the native node and input an edge must
/// actually land on. Composites expose one native node per input.
pub(crate) fn native_input(native: &NativeNodeRef, input: u32) -> Result<(NativeNodeRef, u32)> {
    match native.composite_inputs() {
        Some(inputs) => inputs
            .get(input as usize)
            .map(|part| (NativeNodeRef::clone(part), 0))
            .ok_or_else(|| {
                AudioError::index_size(format!(
                    "input {input} out of range for composite with {} inputs",
                    inputs.len()
                ))
            }),
        None => Ok((NativeNodeRef::clone(native), input)),
    }
}

/// Remembers that `source` feeds `renderer`.
fn track_fed(source: &AudioNode, renderer: Renderer) {
    stores().connected_renderers.update(source, |fed| {
        if !fed.contains(&renderer) {
            fed.push(renderer);
        }
    });
}

/// Forgets the renderers `source` no longer feeds.
fn untrack_unfed(source: &AudioNode, source_renderer: &Renderer) {
    stores()
        .connected_renderers
        .update(source, |fed| fed.retain(|r| r.is_wired_from(source_renderer)));
}

/// Connects `output` of `source` to `input` of `destination`.
pub(crate) fn connect(
    source: &AudioNode,
    destination: &AudioNode,
    output: u32,
    input: u32,
) -> Result<AudioNode> {
    let context = source.context();
    if !context.ptr_eq(&destination.context()) {
        return Err(AudioError::invalid_access(
            "cannot connect nodes that belong to different contexts",
        ));
    }

    if context.is_offline() {
        check_output(source, output)?;
        check_input(destination, input)?;
        let stores = stores();
        let destination_renderer = stores.node_renderers.get(destination).ok_or_else(|| {
            AudioError::invalid_access("destination node is not tracked by this render graph")
        })?;
        let source_renderer = stores.node_renderers.require(source);
        destination_renderer.wire(&source_renderer, output, Some(input));
        track_fed(source, destination_renderer);
    } else {
        let (native_destination, native_input) = native_input(&destination.native(), input)?;
        source
            .native()
            .connect(&native_destination, output, native_input)?;
    }

    let connection = Connection {
        source: source.id(),
        output,
        target: ConnectionTarget::Node {
            id: destination.id(),
            input,
        },
    };
    let added = context.graph().lock().insert(connection);

    #[cfg(feature = "tracing")]
    tracing::debug!(%connection, added, offline = context.is_offline(), "connect");
    #[cfg(not(feature = "tracing"))]
    let _ = added;

    Ok(destination.clone())
}

/// Connects `output` of `source` to `destination`.
pub(crate) fn connect_param(source: &AudioNode, destination: &AudioParam, output: u32) -> Result<()> {
    let context = source.context();

    if context.is_offline() {
        let stores = stores();
        let destination_renderer = stores.param_renderers.get(destination).ok_or_else(|| {
            AudioError::invalid_access("destination param is not tracked by this render graph")
        })?;
        let source_renderer = stores.node_renderers.require(source);
        if !destination_renderer.same_graph(&source_renderer) {
            return Err(AudioError::invalid_access(
                "cannot connect to a param of a different context",
            ));
        }
        check_output(source, output)?;
        destination_renderer.wire(&source_renderer, output, None);
        track_fed(source, destination_renderer);
    } else {
        let native_param = stores().param_natives.require(destination);
        source
            .native()
            .connect_param(&native_param, output)
            .map_err(relabel_invalid_state)?;
    }

    let connection = Connection {
        source: source.id(),
        output,
        target: ConnectionTarget::Param {
            id: destination.id(),
        },
    };
    let added = context.graph().lock().insert(connection);

    #[cfg(feature = "tracing")]
    tracing::debug!(%connection, added, offline = context.is_offline(), "connect_param");
    #[cfg(not(feature = "tracing"))]
    let _ = added;

    Ok(())
}

/// Removes the connections of `source` that `target` selects.
pub(crate) fn disconnect(source: &AudioNode, target: DisconnectTarget<'_>) -> Result<()> {
    let context = source.context();

    // Index errors win over access errors.
    if let Some(output) = target.output() {
        check_output(source, output)?;
    }
    if let DisconnectTarget::Node {
        destination,
        input: Some(input),
        ..
    } = target
    {
        check_input(destination, input)?;
    }

    let foreign = match target {
        DisconnectTarget::Node { destination, .. } => !context.ptr_eq(&destination.context()),
        DisconnectTarget::Param { destination, .. } => !context.ptr_eq(&destination.context()),
        DisconnectTarget::All | DisconnectTarget::Output(_) => false,
    };
    if foreign {
        return Err(AudioError::invalid_access(
            "the destination belongs to a different context",
        ));
    }

    let filter = target.filter();
    let matching = context.graph().lock().matching(source.id(), &filter);
    if target.names_destination() && matching.is_empty() {
        return Err(AudioError::invalid_access(
            "the node is not connected to the given destination",
        ));
    }

    if context.is_offline() {
        disconnect_offline(source, target);
    } else {
        disconnect_live(source, target, &matching)?;
    }

    let removed = context.graph().lock().remove_matching(source.id(), &filter);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        source = %source.id(),
        ?filter,
        removed = removed.len(),
        offline = context.is_offline(),
        "disconnect"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = removed;

    Ok(())
}

fn disconnect_offline(source: &AudioNode, target: DisconnectTarget<'_>) {
    let stores = stores();
    let source_renderer = stores.node_renderers.require(source);
    match target {
        DisconnectTarget::All => {
            let fed = stores.connected_renderers.remove(source).unwrap_or_default();
            for renderer in fed {
                renderer.unwire(&source_renderer);
            }
        }
        DisconnectTarget::Output(output) => {
            let fed = stores.connected_renderers.get(source).unwrap_or_default();
            for renderer in &fed {
                renderer.unwire_matching(&source_renderer, Some(output), None);
            }
            untrack_unfed(source, &source_renderer);
        }
        DisconnectTarget::Node {
            destination,
            output,
            input,
        } => {
            let destination_renderer = stores.node_renderers.require(destination);
            destination_renderer.unwire_matching(&source_renderer, output, input);
            untrack_unfed(source, &source_renderer);
        }
        DisconnectTarget::Param {
            destination,
            output,
        } => {
            let destination_renderer = stores.param_renderers.require(destination);
            destination_renderer.unwire_matching(&source_renderer, output, None);
            untrack_unfed(source, &source_renderer);
        }
    }
}

fn disconnect_live(
    source: &AudioNode,
    target: DisconnectTarget<'_>,
    matching: &[Connection],
) -> Result<()> {
    let native = source.native();
    match target {
        DisconnectTarget::All => native.disconnect()?,
        DisconnectTarget::Output(output) => native.disconnect_output(output)?,
        DisconnectTarget::Node {
            destination,
            output,
            input,
        } => {
            let native_destination = destination.native();
            if native_destination.composite_inputs().is_some() {
                for connection in matching {
                    if let ConnectionTarget::Node { input, .. } = connection.target {
                        let (part, part_input) = native_input(&native_destination, input)?;
                        native.disconnect_node(&part, Some(connection.output), Some(part_input))?;
                    }
                }
            } else {
                native.disconnect_node(&native_destination, output, input)?;
            }
        }
        DisconnectTarget::Param {
            destination,
            output,
        } => {
            let native_param = stores().param_natives.require(destination);
            native.disconnect_param(&native_param, output)?;
        }
    }
    Ok(())
}

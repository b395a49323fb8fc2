//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use evc_msg::TransportError;

/// Failures that stop the control node. All of them are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("status publish failed during {phase}: {source}")]
    Transport {
        phase: &'static str,
        #[source]
        source: TransportError,
    },
}

impl NodeError {
    pub(crate) fn publish(phase: &'static str, source: TransportError) -> Self {
        NodeError::Transport { phase, source }
    }
}

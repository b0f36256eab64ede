//! Who drives a seat, and what each kind of driver may do.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerKind {
    /// A person on a WebSocket.
    Human,
    /// The in-process greedy AI.
    LocalAi,
    /// An external engine spoken to over BGS.
    RemoteBot,
}

/// Checked before any seat action is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_move: bool,
    pub can_resign: bool,
    pub can_give_time: bool,
    pub can_offer_draw: bool,
    pub can_offer_takeback: bool,
    pub can_offer_rematch: bool,
    pub can_chat: bool,
    /// Offers to this seat resolve themselves after a short delay.
    pub auto_accepts: bool,
    /// Moves are requested by the server rather than sent over a socket.
    pub server_driven: bool,
}

impl ControllerKind {
    pub const fn capabilities(self) -> Capabilities {
        match self {
            ControllerKind::Human => Capabilities {
                can_move: true,
                can_resign: true,
                can_give_time: true,
                can_offer_draw: true,
                can_offer_takeback: true,
                can_offer_rematch: true,
                can_chat: true,
                auto_accepts: false,
                server_driven: false,
            },
            ControllerKind::LocalAi | ControllerKind::RemoteBot => Capabilities {
                can_move: true,
                can_resign: false,
                can_give_time: false,
                can_offer_draw: false,
                can_offer_takeback: false,
                can_offer_rematch: false,
                can_chat: false,
                auto_accepts: true,
                server_driven: true,
            },
        }
    }

    pub fn is_bot(self) -> bool {
        self.capabilities().server_driven
    }
}

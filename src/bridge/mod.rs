//! Browser-extension backend: the WebSocket hub, its wire protocol, the
//! meeting service fed by extension events, and the browser-side relay.

pub mod hub;
pub mod protocol;
pub mod relay;
pub mod service;

pub use hub::BridgeHub;
pub use protocol::{BridgeCommand, ExtensionEvent};
pub use relay::{Relay, RelaySettings};
pub use service::{ExtensionMeetService, ExtensionSettings};

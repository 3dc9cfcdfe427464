//! Device Session Controller
//!
//! One controller per discovered sensor. Binds the generic state-machine
//! engine to the device lifecycle: discover, connect, enumerate capabilities,
//! enable streaming, disable, disconnect. Radio completions drive the machine;
//! inbound measurement packets bypass it entirely and go straight through
//! clock fusion.
//!
//! Sessions are fully independent of each other. A session owns its `Device`
//! record exclusively; nothing outside the measurement path ever touches the
//! device's clock state.

use crate::domain::clock;
use crate::domain::models::{
    Capability, Device, HostEvent, OrientationSample, RadioError, RadioEvent, SensorEvent,
};
use crate::domain::state_machine::{
    Branch, ChoicePoint, MachineState, ProtocolError, StateMachine, Transition,
};
use crate::infrastructure::radio::protocol;
use crate::infrastructure::radio::RadioLink;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lifecycle states. The `Post*` and `EnableCheck` states are decision states
/// resolved immediately through their choice points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Discovered,
    Connecting,
    Connected,
    /// Decision: was the enable command actually issued?
    EnableCheck,
    Enabling,
    Streaming,
    Disabling,
    Disconnecting,
    Disconnected,
    Error,
    /// Decision: honor a disconnect queued while connecting/enumerating.
    PostConnect,
    /// Decision: honor a disconnect queued while enabling.
    PostEnable,
    /// Decision: honor a disconnect queued while disabling.
    PostDisable,
}

impl MachineState for SessionState {
    fn is_decision(&self) -> bool {
        matches!(
            self,
            Self::EnableCheck | Self::PostConnect | Self::PostEnable | Self::PostDisable
        )
    }
}

/// Lifecycle events: commands from the caller plus radio completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    Discover,
    Connect,
    Connected,
    CapabilitiesReady,
    Enable,
    ControlWritten,
    Subscribed,
    Disable,
    Disconnect,
    Disconnected,
    Failed,
}

/// Dispatch parameters accompanying a [`SessionEvent`].
#[derive(Debug, Clone)]
pub enum SessionParams {
    None,
    Capabilities(Vec<String>),
    Error(RadioError),
}

/// Mutable session context the transition functions operate on.
pub struct SessionCtx {
    device: Device,
    link: Box<dyn RadioLink>,
    /// Lifecycle posts of the current dispatch, published in call order on
    /// the same scheduling turn.
    outbox: Vec<SensorEvent>,
    /// Queue of the owning service loop; error posts go here so they are
    /// delivered on the *next* turn, after the triggering call stack has
    /// fully unwound.
    defer_tx: mpsc::UnboundedSender<HostEvent>,
    disconnect_requested: bool,
    enable_issued: bool,
}

impl SessionCtx {
    fn post(&mut self, event: SensorEvent) {
        self.outbox.push(event);
    }

    fn defer_error(&mut self, error: RadioError) {
        let event = SensorEvent::SensorError {
            address: self.device.address.clone(),
            error,
        };
        if self.defer_tx.send(HostEvent::Publish(event)).is_err() {
            warn!(address = %self.device.address, "service queue closed, error event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Transition functions
// ---------------------------------------------------------------------------

fn note_discovered(ctx: &mut SessionCtx, _: &SessionParams) {
    debug!(address = %ctx.device.address, name = %ctx.device.name, "sensor discovered");
}

fn start_connect(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.connect();
}

fn start_enumeration(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.enumerate_capabilities();
}

fn adopt_capabilities(ctx: &mut SessionCtx, params: &SessionParams) {
    let SessionParams::Capabilities(handles) = params else {
        warn!(address = %ctx.device.address, "capability completion without handles");
        return;
    };

    ctx.device.capabilities.clear();
    for handle in handles {
        if let Some(capability) = protocol::capability_for_uuid(handle) {
            ctx.device.capabilities.insert(capability, handle.clone());
        }
    }
    debug!(
        address = %ctx.device.address,
        count = ctx.device.capabilities.len(),
        "capabilities populated"
    );
    ctx.post(SensorEvent::SensorConnected {
        address: ctx.device.address.clone(),
    });
}

fn attempt_enable(ctx: &mut SessionCtx, _: &SessionParams) {
    if ctx.device.capability(Capability::Control).is_some() {
        ctx.link.write_control(protocol::control_command(true), false);
        ctx.enable_issued = true;
    } else {
        ctx.enable_issued = false;
        ctx.defer_error(RadioError::CommandWrite(
            "control capability not discovered".into(),
        ));
    }
}

fn start_subscription(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.subscribe_measurement();
}

fn enable_settled(ctx: &mut SessionCtx, _: &SessionParams) {
    debug!(address = %ctx.device.address, "measurement subscription active");
}

fn post_enabled(ctx: &mut SessionCtx, _: &SessionParams) {
    let address = ctx.device.address.clone();
    ctx.post(SensorEvent::SensorEnabled { address });
}

fn start_disable(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.unsubscribe_measurement();
    ctx.link.write_control(protocol::control_command(false), false);
}

fn disable_settled(ctx: &mut SessionCtx, _: &SessionParams) {
    debug!(address = %ctx.device.address, "streaming disabled on device");
}

fn post_disabled(ctx: &mut SessionCtx, _: &SessionParams) {
    let address = ctx.device.address.clone();
    ctx.post(SensorEvent::SensorDisabled { address });
}

fn request_disconnect(ctx: &mut SessionCtx, _: &SessionParams) {
    // An operation is in flight; remembered and honored on its completion.
    ctx.disconnect_requested = true;
}

fn start_disconnect(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.disconnect();
}

fn start_disconnect_streaming(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.link.unsubscribe_measurement();
    ctx.link.disconnect();
}

fn ack_disconnect(ctx: &mut SessionCtx, _: &SessionParams) {
    let address = ctx.device.address.clone();
    ctx.post(SensorEvent::SensorDisconnected { address });
}

fn post_disconnected(ctx: &mut SessionCtx, _: &SessionParams) {
    ctx.disconnect_requested = false;
    let address = ctx.device.address.clone();
    ctx.post(SensorEvent::SensorDisconnected { address });
}

fn peer_dropped(ctx: &mut SessionCtx, _: &SessionParams) {
    let address = ctx.device.address.clone();
    ctx.post(SensorEvent::SensorDisconnected { address });
}

fn fail(ctx: &mut SessionCtx, params: &SessionParams) {
    // A disconnect queued against the failed attempt no longer applies; a
    // later retry starts with a clean slate.
    ctx.disconnect_requested = false;
    let error = match params {
        SessionParams::Error(error) => error.clone(),
        _ => RadioError::Connection("unspecified radio failure".into()),
    };
    ctx.defer_error(error);
}

fn wants_disconnect(ctx: &SessionCtx) -> bool {
    ctx.disconnect_requested
}

fn enable_was_issued(ctx: &SessionCtx) -> bool {
    ctx.enable_issued
}

/// The device lifecycle as a transition table plus its choice points.
fn lifecycle() -> (
    Vec<Transition<SessionState, SessionEvent, SessionCtx, SessionParams>>,
    Vec<ChoicePoint<SessionState, SessionCtx, SessionParams>>,
) {
    use SessionEvent as E;
    use SessionState as S;

    let t = |state, event, action, next| Transition {
        state,
        event,
        action: Some(action),
        next,
    };

    let transitions = vec![
        t(S::Idle, E::Discover, note_discovered, S::Discovered),
        t(S::Discovered, E::Connect, start_connect, S::Connecting),
        t(S::Discovered, E::Disconnect, ack_disconnect, S::Disconnected),
        t(S::Connecting, E::Connected, start_enumeration, S::Connected),
        t(S::Connecting, E::Failed, fail, S::Error),
        t(S::Connecting, E::Disconnect, request_disconnect, S::Connecting),
        t(S::Connected, E::CapabilitiesReady, adopt_capabilities, S::PostConnect),
        t(S::Connected, E::Enable, attempt_enable, S::EnableCheck),
        t(S::Connected, E::Disconnect, start_disconnect, S::Disconnecting),
        t(S::Connected, E::Disconnected, peer_dropped, S::Disconnected),
        t(S::Connected, E::Failed, fail, S::Error),
        t(S::Enabling, E::ControlWritten, start_subscription, S::Enabling),
        t(S::Enabling, E::Subscribed, enable_settled, S::PostEnable),
        t(S::Enabling, E::Disconnect, request_disconnect, S::Enabling),
        t(S::Enabling, E::Failed, fail, S::Error),
        t(S::Streaming, E::Disable, start_disable, S::Disabling),
        t(S::Streaming, E::Disconnect, start_disconnect_streaming, S::Disconnecting),
        t(S::Streaming, E::Disconnected, peer_dropped, S::Disconnected),
        t(S::Streaming, E::Failed, fail, S::Error),
        t(S::Disabling, E::ControlWritten, disable_settled, S::PostDisable),
        t(S::Disabling, E::Disconnect, request_disconnect, S::Disabling),
        t(S::Disabling, E::Failed, fail, S::Error),
        t(S::Disconnecting, E::Disconnected, post_disconnected, S::Disconnected),
        t(S::Disconnecting, E::Failed, fail, S::Error),
        t(S::Disconnected, E::Connect, start_connect, S::Connecting),
        t(S::Error, E::Connect, start_connect, S::Connecting),
        t(S::Error, E::Disconnect, start_disconnect, S::Disconnecting),
    ];

    let choice_points = vec![
        ChoicePoint {
            state: S::PostConnect,
            eval: wants_disconnect,
            on_true: Branch {
                action: Some(start_disconnect),
                next: S::Disconnecting,
            },
            on_false: Branch {
                action: None,
                next: S::Connected,
            },
        },
        ChoicePoint {
            state: S::PostEnable,
            eval: wants_disconnect,
            on_true: Branch {
                action: Some(start_disconnect_streaming),
                next: S::Disconnecting,
            },
            on_false: Branch {
                action: Some(post_enabled),
                next: S::Streaming,
            },
        },
        ChoicePoint {
            state: S::PostDisable,
            eval: wants_disconnect,
            on_true: Branch {
                action: Some(start_disconnect),
                next: S::Disconnecting,
            },
            on_false: Branch {
                action: Some(post_disabled),
                next: S::Connected,
            },
        },
        ChoicePoint {
            state: S::EnableCheck,
            eval: enable_was_issued,
            on_true: Branch {
                action: None,
                next: S::Enabling,
            },
            on_false: Branch {
                action: None,
                next: S::Error,
            },
        },
    ];

    (transitions, choice_points)
}

/// Controller binding one device to its lifecycle machine.
pub struct DeviceSessionController {
    machine: StateMachine<SessionState, SessionEvent, SessionCtx, SessionParams>,
    ctx: SessionCtx,
}

impl DeviceSessionController {
    pub fn new(
        device: Device,
        link: Box<dyn RadioLink>,
        defer_tx: mpsc::UnboundedSender<HostEvent>,
    ) -> Result<Self, ProtocolError> {
        let (transitions, choice_points) = lifecycle();
        let machine = StateMachine::new("device-session", transitions, choice_points)?;
        Ok(Self {
            machine,
            ctx: SessionCtx {
                device,
                link,
                outbox: Vec::new(),
                defer_tx,
                disconnect_requested: false,
                enable_issued: false,
            },
        })
    }

    pub fn address(&self) -> &str {
        &self.ctx.device.address
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Dispatch one lifecycle event and return the lifecycle posts it
    /// produced, in call order.
    pub fn dispatch(&mut self, event: SessionEvent, params: SessionParams) -> Vec<SensorEvent> {
        self.machine.dispatch(&mut self.ctx, event, &params);
        std::mem::take(&mut self.ctx.outbox)
    }

    /// Route a radio completion into the machine. Measurement packets never
    /// touch the machine; they go straight through clock fusion.
    pub fn handle_radio_event(&mut self, event: RadioEvent) -> Vec<SensorEvent> {
        let (event, params) = match event {
            RadioEvent::Measurement { data, host_us } => {
                return self
                    .handle_measurement(&data, host_us)
                    .map(SensorEvent::SensorData)
                    .into_iter()
                    .collect();
            }
            RadioEvent::Connected => (SessionEvent::Connected, SessionParams::None),
            RadioEvent::Capabilities(handles) => (
                SessionEvent::CapabilitiesReady,
                SessionParams::Capabilities(handles),
            ),
            RadioEvent::ControlWritten => (SessionEvent::ControlWritten, SessionParams::None),
            RadioEvent::Subscribed => (SessionEvent::Subscribed, SessionParams::None),
            RadioEvent::Disconnected => (SessionEvent::Disconnected, SessionParams::None),
            RadioEvent::Failed(error) => (SessionEvent::Failed, SessionParams::Error(error)),
        };
        self.dispatch(event, params)
    }

    /// Decode and align one inbound measurement packet.
    pub fn handle_measurement(&mut self, data: &[u8], host_us: f64) -> Option<OrientationSample> {
        match protocol::decode_packet(data) {
            Ok(packet) => Some(clock::synchronize(&mut self.ctx.device, &packet, host_us)),
            Err(error) => {
                debug!(address = %self.ctx.device.address, %error, "dropping malformed packet");
                None
            }
        }
    }
}

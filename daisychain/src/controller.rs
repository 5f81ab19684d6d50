use crate::{
    config::{FullPolicy, SessionConfig},
    error::Error,
    protocol::{
        op::{
            camera,
            interface::{self, CameraInfo},
            pan_tilt::{self, Direction, PanTiltPosition},
            Completion, OperationKind, ReplyShape,
        },
        ErrorCode, Operation, Recipient, Response, Value, ViscaPacket,
    },
    sockets::{is_valid_socket, SocketTable},
    state::{BusState, StateUpdate},
    transport::{open_serial, ViscaChannel},
    Result,
};
use concread::cowcell::asynch::{CowCell, CowCellReadTxn};
use futures::{pin_mut, StreamExt};
use std::{collections::VecDeque, future::Future, sync::Arc, time::Instant};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::{
        broadcast::{self, Receiver},
        mpsc::{self, Sender},
        oneshot,
    },
    time::interval,
};
use tokio_stream::wrappers::IntervalStream;

lazy_static! {
    static ref ADDRESS_SET: ViscaPacket = ViscaPacket::address_set();
}

/// Result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The device finished the command.
    Completed,
    /// The device accepted the command into `socket`, and is still running
    /// it. Only returned for [Completion::Ack] operations.
    Accepted { socket: u8 },
}

/// Who is waiting on a packet, and what they expect back.
enum Waiter {
    Discover(oneshot::Sender<Result<u8>>),
    Command {
        completion: Completion,
        responder: oneshot::Sender<Result<CommandOutcome>>,
    },
    Inquiry {
        reply: ReplyShape,
        responder: oneshot::Sender<Result<Value>>,
    },
    Cancel {
        socket: u8,
        responder: oneshot::Sender<Result>,
    },
    /// `None` for the clear sent after addressing.
    Clear(Option<oneshot::Sender<Result>>),
}

impl Waiter {
    fn fail(self, e: Error) {
        match self {
            Self::Discover(tx) => {
                let _ = tx.send(Err(e));
            }
            Self::Command { responder, .. } => {
                let _ = responder.send(Err(e));
            }
            Self::Inquiry { responder, .. } => {
                let _ = responder.send(Err(e));
            }
            Self::Cancel { responder, .. } => {
                let _ = responder.send(Err(e));
            }
            Self::Clear(Some(tx)) => {
                let _ = tx.send(Err(e));
            }
            Self::Clear(None) => debug!("bus clear failed: {e}"),
        }
    }
}

/// Internal type for asynchronous message passing: a packet to send, and who
/// to tell about its reply.
struct AsyncCommand {
    recipient: Recipient,
    pkt: ViscaPacket,
    waiter: Waiter,
}

/// The packet currently waiting for its first reply.
struct OnWire {
    recipient: Recipient,
    waiter: Waiter,
    deadline: Instant,
}

/// A command which has been accepted into a socket.
struct InFlight {
    /// `None` when the caller was already told about the ACK.
    responder: Option<oneshot::Sender<Result<CommandOutcome>>>,
}

/// Completion data, or the error code from an error reply.
type Reply = std::result::Result<Vec<u8>, u8>;

/// A cancel succeeds when the device reports the command cancelled.
fn cancel_result(code: u8) -> Result {
    if code == ErrorCode::CommandCancelled as u8 {
        Ok(())
    } else {
        Err(Error::from_device(code))
    }
}

impl InFlight {
    fn finish(self, device: u8, socket: u8, reply: &Reply) {
        let r = match reply {
            Ok(_) => Ok(CommandOutcome::Completed),
            Err(code) => Err(Error::from_device(*code)),
        };
        match self.responder {
            Some(tx) => {
                let _ = tx.send(r);
            }
            None => {
                if let Err(e) = r {
                    warn!("command in socket {socket} of device {device} failed: {e}");
                }
            }
        }
    }

    fn fail(self, e: Error) {
        if let Some(tx) = self.responder {
            let _ = tx.send(Err(e));
        }
    }
}

#[allow(rustdoc::private_intra_doc_links)]
/// [ViscaController] runs a session with a chain of VISCA cameras, and keeps
/// state.
///
/// ## General design
///
/// The session is coordinated by a single task, [ViscaReceiver], which owns
/// the serial line. It accepts packets to send from [ViscaController]s,
/// sends them one at a time, matches replies to whoever is waiting on them,
/// and expires anything which has waited too long.
///
/// Each device has two sockets, so up to two commands per device can be
/// running at once. Inquiries don't use sockets.
///
/// Cloning a [ViscaController] gives another handle to the same session. The
/// task stops once all handles are dropped.
pub struct ViscaController {
    cmd_tx: Sender<AsyncCommand>,

    /// State associated with the bus.
    state: Arc<CowCell<BusState>>,
    state_rx: Receiver<(CowCellReadTxn<BusState>, StateUpdate)>,
}

impl Clone for ViscaController {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            state: self.state.clone(),
            state_rx: self.state_rx.resubscribe(),
        }
    }
}

impl ViscaController {
    /// Opens the serial port in `config`, and starts a session on it.
    ///
    /// The bus is not addressed until [discover][Self::discover] is called.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        info!("Opening VISCA bus on {}...", config.serial.path);
        let port = open_serial(&config.serial)?;
        Self::with_transport(port, config.clone())
    }

    /// Starts a session over an arbitrary byte stream.
    pub fn with_transport<T>(io: T, config: SessionConfig) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;
        let (receiver, cmd_tx) = ViscaReceiver::new(ViscaChannel::new(io), config);
        let state = receiver.state.clone();
        let state_rx = receiver.state_tx.subscribe();

        debug!("Spawning receiver task...");
        tokio::task::spawn(async move { receiver.run().await });

        Ok(Self {
            cmd_tx,
            state,
            state_rx,
        })
    }

    /// Queues a packet, and waits for the outcome.
    async fn request<R>(
        &self,
        recipient: Recipient,
        pkt: ViscaPacket,
        waiter: impl FnOnce(oneshot::Sender<Result<R>>) -> Waiter,
    ) -> Result<R> {
        // https://tokio.rs/tokio/tutorial/channels#receive-responses
        let (responder, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(AsyncCommand {
                recipient,
                pkt,
                waiter: waiter(responder),
            })
            .await
            .map_err(|_| Error::ChannelUnavailable)?;
        resp_rx.await.map_err(|_| Error::ChannelUnavailable)?
    }

    fn check_device(device: u8) -> Result {
        if (1..=ViscaPacket::MAX_DEVICES).contains(&device) {
            Ok(())
        } else {
            Err(Error::UnknownDevice(device))
        }
    }

    /// Addresses the bus, returning the number of devices found.
    ///
    /// Devices are then addressable as `1..=n`. This abandons all running
    /// commands and forgets all device info.
    ///
    /// ## Errors
    ///
    /// * [`Error::Timeout`] when the address packet did not come back
    /// * [`Error::NoSocket`] when no devices answered
    pub async fn discover(&self) -> Result<u8> {
        self.request(Recipient::Broadcast, ADDRESS_SET.clone(), Waiter::Discover)
            .await
    }

    /// Sends a command to `device`.
    ///
    /// For [Completion::Await] operations, this returns once the device
    /// reports completion. For [Completion::Ack] operations, this returns once
    /// the device accepts the command.
    ///
    /// ## Errors
    ///
    /// * [`Error::CommandBufferFull`] when both of the device's sockets are
    ///   busy, and [`FullPolicy::Reject`] is set
    /// * [`Error::NoSocket`] when the bus is not addressed
    /// * [`Error::UnknownDevice`] when `device` is not on the bus
    /// * any error the device reports
    pub async fn send_command(&self, device: u8, op: &Operation) -> Result<CommandOutcome> {
        if op.kind != OperationKind::Command {
            return Err(Error::WrongKind(OperationKind::Command));
        }
        Self::check_device(device)?;
        let recipient = Recipient::Device(device);
        let completion = op.completion;
        self.request(recipient, op.encode(recipient)?, |responder| {
            Waiter::Command {
                completion,
                responder,
            }
        })
        .await
    }

    /// Sends an inquiry to `device`, and decodes the reply.
    pub async fn send_inquiry(&self, device: u8, op: &Operation) -> Result<Value> {
        if op.kind != OperationKind::Inquiry {
            return Err(Error::WrongKind(OperationKind::Inquiry));
        }
        Self::check_device(device)?;
        let recipient = Recipient::Device(device);
        let reply = op.reply;
        self.request(recipient, op.encode(recipient)?, |responder| {
            Waiter::Inquiry { reply, responder }
        })
        .await
    }

    /// Cancels the command running in `socket` of `device`.
    ///
    /// The cancelled command's caller gets [`Error::CommandCancelled`]. If the
    /// socket was not busy, the device's error (usually [`Error::NoSocket`])
    /// is returned.
    pub async fn cancel(&self, device: u8, socket: u8) -> Result {
        Self::check_device(device)?;
        self.request(
            Recipient::Device(device),
            ViscaPacket::cancel(device, socket)?,
            |responder| Waiter::Cancel { socket, responder },
        )
        .await
    }

    /// Clears the command buffers of one or all devices, without
    /// re-addressing the bus.
    ///
    /// Commands running on the cleared devices get
    /// [`Error::CommandCancelled`].
    pub async fn clear(&self, recipient: Recipient) -> Result {
        if let Recipient::Device(device) = recipient {
            Self::check_device(device)?;
        }
        self.request(recipient, ViscaPacket::clear(recipient)?, |responder| {
            Waiter::Clear(Some(responder))
        })
        .await
    }

    /// Gets vendor, model and ROM version of `device`, and records it in
    /// [BusState].
    pub async fn camera_info(&self, device: u8) -> Result<CameraInfo> {
        self.send_inquiry(device, &interface::device_info())
            .await?
            .camera_info()
            .ok_or(Error::Internal)
    }

    pub async fn power(&self, device: u8, on: bool) -> Result {
        self.send_command(device, &interface::power(on)).await?;
        Ok(())
    }

    pub async fn power_state(&self, device: u8) -> Result<bool> {
        self.send_inquiry(device, &interface::power_inquiry())
            .await?
            .on_off()
            .ok_or(Error::Internal)
    }

    pub async fn set_zoom(&self, device: u8, position: u16) -> Result {
        self.send_command(device, &camera::zoom_direct(position))
            .await?;
        Ok(())
    }

    pub async fn zoom_position(&self, device: u8) -> Result<u16> {
        self.send_inquiry(device, &camera::zoom_position_inquiry())
            .await?
            .unsigned()
            .ok_or(Error::Internal)
    }

    pub async fn focus_position(&self, device: u8) -> Result<u16> {
        self.send_inquiry(device, &camera::focus_position_inquiry())
            .await?
            .unsigned()
            .ok_or(Error::Internal)
    }

    /// Starts a continuous pan/tilt move, returning once the device accepts
    /// it. Use [Direction::Stop] to stop.
    pub async fn pan_tilt_drive(
        &self,
        device: u8,
        direction: Direction,
        pan_speed: u8,
        tilt_speed: u8,
    ) -> Result<CommandOutcome> {
        let op = pan_tilt::drive(direction, pan_speed, tilt_speed)?;
        self.send_command(device, &op).await
    }

    pub async fn pan_tilt_absolute(
        &self,
        device: u8,
        position: PanTiltPosition,
        pan_speed: u8,
        tilt_speed: u8,
    ) -> Result {
        let op = pan_tilt::absolute(position, pan_speed, tilt_speed)?;
        self.send_command(device, &op).await?;
        Ok(())
    }

    pub async fn pan_tilt_home(&self, device: u8) -> Result {
        self.send_command(device, &pan_tilt::home()).await?;
        Ok(())
    }

    pub async fn pan_tilt_position(&self, device: u8) -> Result<PanTiltPosition> {
        let v = self
            .send_inquiry(device, &pan_tilt::position_inquiry())
            .await?;
        PanTiltPosition::from_value(&v).ok_or(Error::Internal)
    }

    pub async fn get_state(&self) -> impl std::ops::Deref<Target = BusState> {
        self.state.read().await
    }

    pub fn state_update_events(&self) -> Receiver<(CowCellReadTxn<BusState>, StateUpdate)> {
        self.state_rx.resubscribe()
    }
}

/// Coordinates the bus.
///
/// This runs its own event loop ([`ViscaReceiver::run()`]).
struct ViscaReceiver<T> {
    config: SessionConfig,
    channel: ViscaChannel<T>,
    cmd_rx: mpsc::Receiver<AsyncCommand>,
    /// Packets waiting to be sent, in order.
    queue: VecDeque<AsyncCommand>,
    /// Commands for devices with no free socket, with [FullPolicy::Wait].
    blocked: VecDeque<AsyncCommand>,
    /// The packet which was last sent, until its first reply.
    wire: Option<OnWire>,
    sockets: SocketTable<InFlight>,
    /// Number of devices on the bus, or [None] if not addressed.
    device_count: Option<u8>,
    state: Arc<CowCell<BusState>>,
    state_tx: broadcast::Sender<(CowCellReadTxn<BusState>, StateUpdate)>,
}

impl<T> ViscaReceiver<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Depth of the command transmit buffer.
    ///
    /// This affects how many [`AsyncCommand`]s can sit in
    /// [`cmd_rx`][Self::cmd_rx] before callers wait.
    const COMMAND_CHANNEL_SIZE: usize = 16;

    fn new(channel: ViscaChannel<T>, config: SessionConfig) -> (Self, Sender<AsyncCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(Self::COMMAND_CHANNEL_SIZE);
        let (state_tx, _) = broadcast::channel(16);
        (
            Self {
                config,
                channel,
                cmd_rx,
                queue: VecDeque::new(),
                blocked: VecDeque::new(),
                wire: None,
                sockets: SocketTable::new(),
                device_count: None,
                state: Arc::new(CowCell::new(BusState::default())),
                state_tx,
            },
            cmd_tx,
        )
    }

    async fn run(mut self) -> Result {
        debug!("starting main_loop");
        let r = self.main_loop().await.map_err(|e| match e {
            Error::IoError(e) => Error::Transport(Arc::new(e)),
            e => e,
        });
        if let Err(e) = &r {
            error!("VISCA bus error: {e}");
            self.fail_all(|| match e {
                Error::Transport(e) => Error::Transport(e.clone()),
                _ => Error::ChannelUnavailable,
            });
        }
        r
    }

    /// Fails everything which is waiting on the bus.
    fn fail_all(&mut self, reason: impl Fn() -> Error) {
        self.cmd_rx.close();
        if let Some(w) = self.wire.take() {
            w.waiter.fail(reason());
        }
        for e in self.sockets.clear_all() {
            e.fail(reason());
        }
        for cmd in self.queue.drain(..).chain(self.blocked.drain(..)) {
            cmd.waiter.fail(reason());
        }
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            cmd.waiter.fail(reason());
        }
    }

    /// Starts the main event loop. There are three sources of events:
    ///
    /// * `cmd_rx.recv`: queues packets to send to the bus
    ///
    /// * `channel.recv`: [classifies and routes replies][Self::handle_incoming_packet]
    ///
    /// * `wakeup`: [times out][Self::expire] the packet on the wire and any
    ///   running commands.
    ///
    /// After each event, the next queued packet is [sent][Self::pump] if the
    /// wire is free.
    async fn main_loop(&mut self) -> Result {
        let wakeup = IntervalStream::new(interval(self.config.poll_interval()));
        pin_mut!(wakeup);

        loop {
            select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all controllers dropped, stopping main_loop");
                        return Ok(());
                    };
                    self.queue.push_back(cmd);
                }

                r = self.channel.recv() => {
                    self.handle_incoming_packet(r?).await;
                }

                Some(_) = wakeup.next() => {
                    self.expire(Instant::now()).await;
                }
            }

            self.pump().await;
        }
    }

    /// Checks that a device-addressed packet can be sent.
    fn check_target(&self, recipient: Recipient) -> Result {
        let Recipient::Device(device) = recipient else {
            return Ok(());
        };
        match self.device_count {
            None => Err(Error::NoSocket),
            Some(n) if device == 0 || device > n => Err(Error::UnknownDevice(device)),
            Some(_) => Ok(()),
        }
    }

    /// Sends queued packets until one is waiting for a reply.
    async fn pump(&mut self) {
        while self.wire.is_none() {
            let Some(cmd) = self.queue.pop_front() else {
                return;
            };

            if let Err(e) = self.check_target(cmd.recipient) {
                cmd.waiter.fail(e);
                continue;
            }

            let needs_socket = matches!(cmd.waiter, Waiter::Command { .. });
            if let (Recipient::Device(device), true) = (cmd.recipient, needs_socket) {
                if self.sockets.is_full(device) {
                    match self.config.when_full {
                        FullPolicy::Reject => {
                            debug!("device {device} has no free socket");
                            cmd.waiter.fail(Error::CommandBufferFull);
                        }
                        FullPolicy::Wait => {
                            debug!("device {device} has no free socket, holding command");
                            self.blocked.push_back(cmd);
                        }
                    }
                    continue;
                }
            }

            let timeout = if matches!(cmd.waiter, Waiter::Discover(_)) {
                self.unaddress(StateUpdate::empty()).await;
                self.config.discovery_timeout()
            } else {
                self.config.reply_timeout()
            };

            if let Err(e) = self.channel.send(&cmd.pkt).await {
                error!("could not send {:?}: {e}", cmd.pkt);
                cmd.waiter.fail(e);
                continue;
            }

            self.wire = Some(OnWire {
                recipient: cmd.recipient,
                waiter: cmd.waiter,
                deadline: Instant::now() + timeout,
            });
        }
    }

    /// Returns held commands to the front of the queue, to be re-checked.
    fn unblock(&mut self) {
        while let Some(cmd) = self.blocked.pop_back() {
            self.queue.push_front(cmd);
        }
    }

    /// Forgets all devices. Running and held commands get
    /// [`Error::NoSocket`].
    async fn unaddress(&mut self, update: StateUpdate) {
        self.device_count = None;
        for e in self.sockets.clear_all() {
            e.fail(Error::NoSocket);
        }
        for cmd in self.blocked.drain(..) {
            cmd.waiter.fail(Error::NoSocket);
        }
        self.update_state(move |s| s.set_device_count(None) | update)
            .await;
    }

    /// Applies `f` to the bus state, and broadcasts what changed.
    ///
    /// The returned future does not borrow `self`.
    fn update_state(
        &self,
        f: impl FnOnce(&mut BusState) -> StateUpdate + Send + 'static,
    ) -> impl Future<Output = ()> + Send + 'static {
        let state = self.state.clone();
        let state_tx = self.state_tx.clone();
        async move {
            let mut w = state.write().await;
            let updated_fields = f(&mut w);
            if updated_fields.is_empty() {
                return;
            }
            w.commit().await;

            // It doesn't matter whether this actually succeeds
            let _ = state_tx.send((state.read().await, updated_fields));
        }
    }

    async fn unsolicited(&mut self) {
        self.update_state(move |s| {
            s.unsolicited_count += 1;
            StateUpdate::UNSOLICITED
        })
        .await;
    }

    async fn handle_incoming_packet(&mut self, pkt: ViscaPacket) {
        let discovering = matches!(
            self.wire,
            Some(OnWire {
                waiter: Waiter::Discover(_),
                ..
            })
        );
        let resp = match Response::classify(&pkt, discovering) {
            Ok(r) => r,
            Err(e) => {
                warn!("dropping {pkt:?}: {e}");
                self.unsolicited().await;
                return;
            }
        };

        let device = pkt.source();
        match resp {
            Response::Address { next } => self.handle_address(next).await,
            Response::ClearEcho => self.handle_clear_echo().await,
            Response::NetworkChange => {
                warn!("device {device} reports a network change, bus needs addressing");
                self.unaddress(StateUpdate::NETWORK_CHANGE).await;
            }
            Response::Ack { socket } => self.handle_ack(device, socket).await,
            Response::Completion { socket, data } => {
                self.handle_reply(device, socket, Ok(data)).await
            }
            Response::Error { socket, code } => self.handle_reply(device, socket, Err(code)).await,
        }
    }

    async fn handle_address(&mut self, next: u8) {
        let responder = match self.wire.take() {
            Some(OnWire {
                waiter: Waiter::Discover(responder),
                ..
            }) => responder,
            other => {
                self.wire = other;
                warn!("unexpected address reply");
                self.unsolicited().await;
                return;
            }
        };

        let count = next.saturating_sub(1);
        if count == 0 {
            warn!("no devices answered addressing");
            let _ = responder.send(Err(Error::NoSocket));
            return;
        }
        if count > ViscaPacket::MAX_DEVICES {
            let _ = responder.send(Err(Error::MalformedPacket(format!(
                "address reply for {count} devices"
            ))));
            return;
        }

        info!("found {count} device(s)");
        self.device_count = Some(count);
        self.update_state(move |s| s.set_device_count(Some(count)))
            .await;
        let _ = responder.send(Ok(count));

        if self.config.clear_after_discovery {
            match ViscaPacket::clear(Recipient::Broadcast) {
                Ok(pkt) => self.queue.push_front(AsyncCommand {
                    recipient: Recipient::Broadcast,
                    pkt,
                    waiter: Waiter::Clear(None),
                }),
                Err(e) => error!("could not build clear packet: {e}"),
            }
        }
    }

    async fn handle_clear_echo(&mut self) {
        let responder = match self.wire.take() {
            Some(OnWire {
                recipient: Recipient::Broadcast,
                waiter: Waiter::Clear(responder),
                ..
            }) => responder,
            other => {
                self.wire = other;
                warn!("unexpected clear echo");
                self.unsolicited().await;
                return;
            }
        };

        for e in self.sockets.clear_all() {
            e.fail(Error::CommandCancelled);
        }
        self.unblock();
        if let Some(tx) = responder {
            let _ = tx.send(Ok(()));
        }
    }

    async fn handle_ack(&mut self, device: u8, socket: u8) {
        let (completion, responder) = match self.wire.take() {
            Some(OnWire {
                recipient,
                waiter:
                    Waiter::Command {
                        completion,
                        responder,
                    },
                ..
            }) if recipient == Recipient::Device(device) => (completion, responder),
            other => {
                self.wire = other;
                warn!("unexpected ACK for socket {socket} from device {device}");
                self.unsolicited().await;
                return;
            }
        };

        if !is_valid_socket(socket) {
            let _ = responder.send(Err(Error::MalformedPacket(format!(
                "ACK for socket {socket}"
            ))));
            return;
        }

        trace!("device {device} accepted command into socket {socket}");
        let entry = match completion {
            Completion::Ack => {
                let _ = responder.send(Ok(CommandOutcome::Accepted { socket }));
                InFlight { responder: None }
            }
            Completion::Await => InFlight {
                responder: Some(responder),
            },
        };

        let deadline = Instant::now() + self.config.completion_timeout();
        match self.sockets.occupy(device, socket, deadline, entry) {
            Ok(None) => (),
            Ok(Some(previous)) => {
                warn!("device {device} reused busy socket {socket}");
                previous.fail(Error::Internal);
            }
            Err(e) => error!("could not record socket: {e}"),
        }
    }

    /// Routes a completion or error reply.
    ///
    /// A reply for a busy socket closes it. Anything else answers the packet
    /// on the wire for that device, if there is one.
    async fn handle_reply(&mut self, device: u8, socket: u8, reply: Reply) {
        if socket != 0 {
            if let Some(entry) = self.sockets.take(device, socket) {
                entry.finish(device, socket, &reply);
                self.unblock();

                // The device answers a cancel on the socket it targets.
                if let Err(code) = reply {
                    match self.wire.take() {
                        Some(OnWire {
                            recipient,
                            waiter:
                                Waiter::Cancel {
                                    socket: s,
                                    responder,
                                },
                            ..
                        }) if recipient == Recipient::Device(device) && s == socket => {
                            let _ = responder.send(cancel_result(code));
                        }
                        other => self.wire = other,
                    }
                }
                return;
            }
        }

        // Only errors may name a socket which is not busy.
        let is_error = reply.is_err();
        let accepts = |w: &OnWire| {
            w.recipient == Recipient::Device(device)
                && match w.waiter {
                    Waiter::Inquiry { .. } => socket == 0,
                    Waiter::Command { .. } | Waiter::Cancel { .. } | Waiter::Clear(_) => {
                        socket == 0 || is_error
                    }
                    Waiter::Discover(_) => false,
                }
        };

        match self.wire.take() {
            Some(w) if accepts(&w) => self.resolve(device, w.waiter, reply).await,
            other => {
                self.wire = other;
                warn!("unexpected reply for socket {socket} from device {device}: {reply:?}");
                self.unsolicited().await;
            }
        }
    }

    /// Answers the packet which was on the wire.
    async fn resolve(&mut self, device: u8, waiter: Waiter, reply: Reply) {
        match waiter {
            Waiter::Command { responder, .. } => {
                let _ = responder.send(match reply {
                    Ok(_) => Ok(CommandOutcome::Completed),
                    Err(code) => Err(Error::from_device(code)),
                });
            }

            Waiter::Inquiry { reply: shape, responder } => {
                let r = match reply {
                    Ok(data) => shape.decode(&data).map_err(Error::from),
                    Err(code) => Err(Error::from_device(code)),
                };
                if let Ok(Value::CameraInfo(info)) = &r {
                    let info = *info;
                    self.update_state(move |s| s.set_camera_info(device, info))
                        .await;
                }
                let _ = responder.send(r);
            }

            Waiter::Cancel { responder, .. } => {
                let _ = responder.send(match reply {
                    Err(code) => cancel_result(code),
                    Ok(_) => Ok(()),
                });
            }

            Waiter::Clear(responder) => {
                let r = match reply {
                    Ok(_) => {
                        for e in self.sockets.clear_device(device) {
                            e.fail(Error::CommandCancelled);
                        }
                        self.unblock();
                        Ok(())
                    }
                    Err(code) => Err(Error::from_device(code)),
                };
                if let Some(tx) = responder {
                    let _ = tx.send(r);
                }
            }

            Waiter::Discover(responder) => {
                let _ = responder.send(Err(Error::Internal));
            }
        }
    }

    /// Times out the packet on the wire, and frees sockets whose commands
    /// have not completed in time.
    async fn expire(&mut self, now: Instant) {
        if self.wire.as_ref().is_some_and(|w| w.deadline <= now) {
            if let Some(w) = self.wire.take() {
                warn!("no reply from {:?}", w.recipient);
                w.waiter.fail(Error::Timeout);
            }
        }

        let expired = self.sockets.expire(now);
        if expired.is_empty() {
            return;
        }
        for (device, socket, entry) in expired {
            warn!("freeing socket {socket} of device {device}: no completion");
            entry.fail(Error::Timeout);
        }
        self.unblock();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::Framer;
    use std::{
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };
    use tokio::{
        io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf},
        time::{sleep, timeout},
    };

    struct FakeBus {
        /// Every packet the bus received, as hex.
        seen: mpsc::UnboundedReceiver<String>,
        /// Sends bytes (as hex) from the bus.
        inject: mpsc::UnboundedSender<&'static str>,
    }

    impl FakeBus {
        /// Waits until the bus receives `pkt`.
        async fn wait_for(&mut self, pkt: &str) {
            while let Some(seen) = self.seen.recv().await {
                if seen == pkt {
                    return;
                }
            }
            panic!("bus closed before {pkt}");
        }
    }

    /// Spawns a chain of `devices` cameras which answer addressing and
    /// broadcast clears, passing all other packets (as hex) to `script`.
    ///
    /// With `devices = None`, addressing is never answered.
    fn fake_bus(
        mut io: DuplexStream,
        devices: Option<u8>,
        mut script: impl FnMut(&str) -> Vec<&'static str> + Send + 'static,
    ) -> FakeBus {
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let (inject, mut inject_rx) = mpsc::unbounded_channel::<&'static str>();

        tokio::task::spawn(async move {
            let mut framer = Framer::new();
            let mut b = [0u8; 64];
            loop {
                select! {
                    r = io.read(&mut b) => {
                        let l = match r {
                            Ok(0) | Err(_) => break,
                            Ok(l) => l,
                        };
                        framer.push(&b[..l]);
                        while let Some(Ok(pkt)) = framer.next_packet() {
                            let cmd = hex::encode(pkt.encode().unwrap());
                            let replies: Vec<String> = match (cmd.as_str(), devices) {
                                ("883001ff", None) => vec![],
                                ("883001ff", Some(n)) => vec![format!("8830{:02x}ff", n + 1)],
                                ("88010001ff", _) => vec![cmd.clone()],
                                _ => script(&cmd).into_iter().map(String::from).collect(),
                            };
                            io.write_all(&hex::decode(replies.concat()).unwrap())
                                .await
                                .unwrap();
                            let _ = seen_tx.send(cmd);
                        }
                    }

                    Some(h) = inject_rx.recv() => {
                        io.write_all(&hex::decode(h).unwrap()).await.unwrap();
                    }
                }
            }
        });

        FakeBus { seen, inject }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 10,
            reply_timeout_ms: 200,
            completion_timeout_ms: 300,
            discovery_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn connect(
        devices: Option<u8>,
        config: SessionConfig,
        script: impl FnMut(&str) -> Vec<&'static str> + Send + 'static,
    ) -> Result<(ViscaController, FakeBus)> {
        let (a, b) = duplex(256);
        let bus = fake_bus(b, devices, script);
        let c = ViscaController::with_transport(a, config)?;
        Ok((c, bus))
    }

    /// Replies to each matching packet with the next entry of `replies`.
    fn sequence(
        pkt: &'static str,
        replies: &[&'static [&'static str]],
    ) -> impl FnMut(&str) -> Vec<&'static str> + Send + 'static {
        let mut replies: VecDeque<_> = replies.iter().copied().collect();
        move |cmd: &str| {
            if cmd == pkt {
                replies.pop_front().unwrap_or_default().to_vec()
            } else {
                vec![]
            }
        }
    }

    const ZOOM_TELE: &str = "8101040702ff";

    #[tokio::test]
    async fn discovery() -> Result<()> {
        let (c, mut bus) = connect(Some(3), test_config(), |_| vec![])?;
        let mut events = c.state_update_events();

        assert_eq!(3, c.discover().await?);
        bus.wait_for("883001ff").await;
        // followed by a broadcast clear
        bus.wait_for("88010001ff").await;

        let state = c.get_state().await;
        assert_eq!(Some(3), state.device_count);
        assert_eq!(3, state.devices.len());

        loop {
            let (s, update) = events.recv().await.unwrap();
            if update.contains(StateUpdate::DEVICE_COUNT) && s.device_count.is_some() {
                break;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn discovery_timeout() -> Result<()> {
        let (c, _bus) = connect(None, test_config(), |_| vec![])?;
        assert!(matches!(c.discover().await, Err(Error::Timeout)));
        assert!(!c.get_state().await.is_addressed());
        assert!(matches!(
            c.send_command(1, &pan_tilt::home()).await,
            Err(Error::NoSocket)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn discovery_no_devices() -> Result<()> {
        let (c, _bus) = connect(Some(0), test_config(), |_| vec![])?;
        assert!(matches!(c.discover().await, Err(Error::NoSocket)));
        assert!(matches!(
            c.send_inquiry(1, &camera::zoom_position_inquiry()).await,
            Err(Error::NoSocket)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_device() -> Result<()> {
        let (c, _bus) = connect(Some(2), test_config(), |_| vec![])?;
        c.discover().await?;
        assert!(matches!(
            c.send_command(3, &pan_tilt::home()).await,
            Err(Error::UnknownDevice(3))
        ));
        assert!(matches!(
            c.send_command(9, &pan_tilt::home()).await,
            Err(Error::UnknownDevice(9))
        ));
        assert!(matches!(
            c.send_command(1, &camera::zoom_position_inquiry()).await,
            Err(Error::WrongKind(OperationKind::Command))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn pan_tilt_stop() -> Result<()> {
        let (c, _bus) = connect(
            Some(1),
            test_config(),
            sequence(
                "8101060101010303ff",
                &[&["9041ff", "9051ff"], &["906141ff"]],
            ),
        )?;
        c.discover().await?;

        assert_eq!(
            CommandOutcome::Completed,
            c.send_command(1, &pan_tilt::stop()).await?
        );
        assert!(matches!(
            c.send_command(1, &pan_tilt::stop()).await,
            Err(Error::NotExecutable)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn two_sockets() -> Result<()> {
        let (c, bus) = connect(
            Some(1),
            test_config(),
            sequence(ZOOM_TELE, &[&["9041ff"], &["9042ff"], &["9041ff"]]),
        )?;
        c.discover().await?;
        let op = camera::zoom_tele().ack_only();

        assert_eq!(
            CommandOutcome::Accepted { socket: 1 },
            c.send_command(1, &op).await?
        );
        assert_eq!(
            CommandOutcome::Accepted { socket: 2 },
            c.send_command(1, &op).await?
        );
        assert!(matches!(
            c.send_command(1, &op).await,
            Err(Error::CommandBufferFull)
        ));

        // Socket 1 completes
        bus.inject.send("9051ff").unwrap();
        for _ in 0..50 {
            match c.send_command(1, &op).await {
                Ok(o) => {
                    assert_eq!(CommandOutcome::Accepted { socket: 1 }, o);
                    return Ok(());
                }
                Err(Error::CommandBufferFull) => sleep(Duration::from_millis(10)).await,
                Err(e) => return Err(e),
            }
        }
        panic!("socket 1 never freed");
    }

    #[tokio::test]
    async fn wait_for_socket() -> Result<()> {
        let config = SessionConfig {
            when_full: FullPolicy::Wait,
            ..test_config()
        };
        let (c, bus) = connect(
            Some(1),
            config,
            sequence(ZOOM_TELE, &[&["9041ff"], &["9042ff"], &["9042ff"]]),
        )?;
        c.discover().await?;
        let op = camera::zoom_tele().ack_only();
        c.send_command(1, &op).await?;
        c.send_command(1, &op).await?;

        let c2 = c.clone();
        let op2 = op.clone();
        let mut third = tokio::task::spawn(async move { c2.send_command(1, &op2).await });
        assert!(timeout(Duration::from_millis(50), &mut third).await.is_err());

        bus.inject.send("9052ff").unwrap();
        assert_eq!(
            CommandOutcome::Accepted { socket: 2 },
            third.await.unwrap()?
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancel() -> Result<()> {
        let (c, mut bus) = connect(Some(1), test_config(), |cmd| match cmd {
            ZOOM_TELE => vec!["9041ff"],
            "8121ff" => vec!["906104ff"],
            "8122ff" => vec!["906205ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        let c2 = c.clone();
        let zoom = tokio::task::spawn(async move { c2.send_command(1, &camera::zoom_tele()).await });
        bus.wait_for(ZOOM_TELE).await;

        c.cancel(1, 1).await?;
        assert!(matches!(
            zoom.await.unwrap(),
            Err(Error::CommandCancelled)
        ));

        // Nothing in socket 2
        assert!(matches!(c.cancel(1, 2).await, Err(Error::NoSocket)));
        Ok(())
    }

    #[tokio::test]
    async fn unsolicited_replies_dropped() -> Result<()> {
        let mut acks = VecDeque::from(["9041ff", "9042ff"]);
        let (c, _bus) = connect(Some(1), test_config(), move |cmd: &str| match cmd {
            ZOOM_TELE => acks.pop_front().into_iter().collect(),
            // completion for an idle socket, and an ACK from another device
            "81090447ff" => vec!["9052ff", "a041ff", "905000010203ff"],
            _ => vec![],
        })?;
        c.discover().await?;
        let mut events = c.state_update_events();
        let op = camera::zoom_tele().ack_only();

        assert_eq!(
            CommandOutcome::Accepted { socket: 1 },
            c.send_command(1, &op).await?
        );
        assert_eq!(0x0123, c.zoom_position(1).await?);

        loop {
            let (_, update) = events.recv().await.unwrap();
            if update.contains(StateUpdate::UNSOLICITED) {
                break;
            }
        }

        assert_eq!(2, c.get_state().await.unsolicited_count);

        // Socket 1 is still busy, so the next command gets socket 2
        assert_eq!(
            CommandOutcome::Accepted { socket: 2 },
            c.send_command(1, &op).await?
        );
        assert!(matches!(
            c.send_command(1, &op).await,
            Err(Error::CommandBufferFull)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stale_completion_ignored() -> Result<()> {
        // A completion for socket 2 arrives before the ACK for this command.
        let (c, _bus) = connect(Some(1), test_config(), |cmd| match cmd {
            ZOOM_TELE => vec!["9052ff", "9041ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        assert_eq!(
            CommandOutcome::Accepted { socket: 1 },
            c.send_command(1, &camera::zoom_tele().ack_only()).await?
        );
        assert_eq!(1, c.get_state().await.unsolicited_count);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_refused() -> Result<()> {
        let (c, mut bus) = connect(Some(1), test_config(), |cmd| match cmd {
            ZOOM_TELE => vec!["9041ff"],
            "8121ff" => vec!["906141ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        let c2 = c.clone();
        let zoom = tokio::task::spawn(async move { c2.send_command(1, &camera::zoom_tele()).await });
        bus.wait_for(ZOOM_TELE).await;

        // Answered well before the reply timeout
        let r = timeout(Duration::from_millis(100), c.cancel(1, 1))
            .await
            .expect("cancel was not answered");
        assert!(matches!(r, Err(Error::NotExecutable)));
        assert!(matches!(zoom.await.unwrap(), Err(Error::NotExecutable)));
        Ok(())
    }

    /// Wraps a stream so that reads fail once `fault` is signalled.
    struct FaultyLine {
        io: DuplexStream,
        fault: mpsc::UnboundedReceiver<()>,
    }

    impl AsyncRead for FaultyLine {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if let Poll::Ready(Some(())) = self.fault.poll_recv(cx) {
                return Poll::Ready(Err(std::io::Error::other("line fault")));
            }
            Pin::new(&mut self.io).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FaultyLine {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.io).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.io).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.io).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn transport_failure() -> Result<()> {
        let (a, b) = duplex(256);
        let (fault_tx, fault) = mpsc::unbounded_channel();
        let mut bus = fake_bus(b, Some(1), |cmd| match cmd {
            ZOOM_TELE => vec!["9041ff"],
            _ => vec![],
        });
        let c = ViscaController::with_transport(FaultyLine { io: a, fault }, test_config())?;
        c.discover().await?;

        // One command running in a socket, and an inquiry on the wire
        let c2 = c.clone();
        let zoom = tokio::task::spawn(async move { c2.send_command(1, &camera::zoom_tele()).await });
        bus.wait_for(ZOOM_TELE).await;
        let c3 = c.clone();
        let inquiry = tokio::task::spawn(async move { c3.zoom_position(1).await });
        bus.wait_for("81090447ff").await;

        fault_tx.send(()).unwrap();
        assert!(matches!(zoom.await.unwrap(), Err(Error::Transport(_))));
        assert!(matches!(inquiry.await.unwrap(), Err(Error::Transport(_))));
        assert!(matches!(
            c.pan_tilt_home(1).await,
            Err(Error::ChannelUnavailable)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn inquiries() -> Result<()> {
        let (c, _bus) = connect(Some(2), test_config(), |cmd| match cmd {
            "82090002ff" => vec!["a05000200402011002ff"],
            "82090612ff" => vec!["a0500f0c09000001020cff"],
            "82090400ff" => vec!["a05002ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        let info = c.camera_info(2).await?;
        assert_eq!(0x0402, info.model);
        assert_eq!(Some(info), c.get_state().await.device(2).and_then(|d| d.info));

        assert_eq!(
            PanTiltPosition::new(-880, 300),
            c.pan_tilt_position(2).await?
        );
        assert!(c.power_state(2).await?);
        Ok(())
    }

    #[tokio::test]
    async fn reply_timeout() -> Result<()> {
        let (c, _bus) = connect(Some(1), test_config(), |cmd| match cmd {
            "81010604ff" => vec!["9041ff", "9051ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        assert!(matches!(c.zoom_position(1).await, Err(Error::Timeout)));
        c.pan_tilt_home(1).await?;
        Ok(())
    }

    #[tokio::test]
    async fn completion_timeout() -> Result<()> {
        let (c, _bus) = connect(
            Some(1),
            test_config(),
            sequence(ZOOM_TELE, &[&["9041ff"], &["9041ff"], &["9042ff"]]),
        )?;
        c.discover().await?;

        assert!(matches!(
            c.send_command(1, &camera::zoom_tele()).await,
            Err(Error::Timeout)
        ));

        // The socket was freed
        let op = camera::zoom_tele().ack_only();
        assert_eq!(
            CommandOutcome::Accepted { socket: 1 },
            c.send_command(1, &op).await?
        );
        assert_eq!(
            CommandOutcome::Accepted { socket: 2 },
            c.send_command(1, &op).await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn clear() -> Result<()> {
        let (c, mut bus) = connect(Some(1), test_config(), |cmd| match cmd {
            ZOOM_TELE => vec!["9041ff"],
            "81010001ff" => vec!["9050ff"],
            _ => vec![],
        })?;
        c.discover().await?;

        let c2 = c.clone();
        let zoom = tokio::task::spawn(async move { c2.send_command(1, &camera::zoom_tele()).await });
        bus.wait_for(ZOOM_TELE).await;
        c.clear(Recipient::Device(1)).await?;
        assert!(matches!(
            zoom.await.unwrap(),
            Err(Error::CommandCancelled)
        ));

        c.clear(Recipient::Broadcast).await?;
        Ok(())
    }

    #[tokio::test]
    async fn network_change() -> Result<()> {
        let (c, bus) = connect(Some(1), test_config(), |_| vec![])?;
        c.discover().await?;
        let mut events = c.state_update_events();

        bus.inject.send("9038ff").unwrap();
        loop {
            let (s, update) = events.recv().await.unwrap();
            if update.contains(StateUpdate::NETWORK_CHANGE) {
                assert!(!s.is_addressed());
                break;
            }
        }
        assert!(matches!(
            c.pan_tilt_home(1).await,
            Err(Error::NoSocket)
        ));
        Ok(())
    }
}

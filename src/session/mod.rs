pub mod transport;

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::device::{Command, CommandSet, Reply, Request, SoundSettings};
use crate::protocol::{frame, FrameDecoder, FramingError, Packet};

pub use transport::{ByteStream, ReadEvent, StreamTransport, Transport, TransportError};

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a command is already awaiting acknowledgement")]
    Busy,

    #[error("device did not respond within {0:?}")]
    TimedOut(Duration),

    #[error("unexpected data from device: {0}")]
    Rejected(#[from] FramingError),

    #[error("connection to device closed")]
    TransportClosed,

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl SessionError {
    /// Whether resending the same command on this session may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut(_) | Self::Rejected(_))
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => Self::TransportClosed,
            other => Self::Transport(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A command with this sequence number is on the wire.
    AwaitingAck { seq: u8 },
    /// The query was acknowledged; the status report has not arrived yet.
    AwaitingReport,
    Closed,
}

/// How the last exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    TimedOut,
    Rejected,
    Failed,
}

/// Drives one command at a time over a [`Transport`].
///
/// Each command is written as a frame and the session then waits for the
/// ACK carrying the matching sequence number. Data packets the device sends
/// in the meantime are acknowledged and otherwise ignored.
pub struct SessionController<T> {
    transport: T,
    commands: CommandSet,
    decoder: FrameDecoder,
    state: SessionState,
    seq: u8,
    timeout: Duration,
    last_outcome: Option<Outcome>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(transport: T, commands: CommandSet) -> Self {
        Self {
            transport,
            commands,
            decoder: FrameDecoder::new(),
            state: SessionState::Idle,
            seq: 0,
            timeout: DEFAULT_REPLY_TIMEOUT,
            last_outcome: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    /// Sequence number the next command will carry.
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// Send `command` and wait for its ACK.
    pub async fn send(&mut self, command: Command) -> Result<(), SessionError> {
        self.exchange(command, false).await.map(|_| ())
    }

    /// Ask the device for its current sound settings.
    pub async fn query_sound_settings(&mut self) -> Result<SoundSettings, SessionError> {
        match self.exchange(Command::GetSoundSettings, true).await? {
            Some(settings) => Ok(settings),
            None => Err(SessionError::TimedOut(self.timeout)),
        }
    }

    /// Return to idle after an exchange was abandoned mid-flight.
    ///
    /// Buffered input is dropped. A closed session stays closed.
    pub fn reset(&mut self) {
        self.decoder.clear();
        if self.state != SessionState::Closed {
            self.set_state(SessionState::Idle);
        }
    }

    async fn exchange(
        &mut self,
        command: Command,
        want_report: bool,
    ) -> Result<Option<SoundSettings>, SessionError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Closed => return Err(SessionError::TransportClosed),
            SessionState::AwaitingAck { .. } | SessionState::AwaitingReport => {
                return Err(SessionError::Busy)
            }
        }

        let deadline = Instant::now() + self.timeout;
        let request = Request {
            command,
            seq: self.seq,
        };
        let packet = Packet::command(request.seq, self.commands.build(&command));
        debug!("TX: {}", packet);

        self.set_state(SessionState::AwaitingAck { seq: request.seq });
        let result = match self.transport.write(&frame::encode(&packet)).await {
            Ok(()) => self.await_reply(&request, want_report, deadline).await,
            Err(e) => Err(e.into()),
        };
        self.finish(&request, &result);
        result
    }

    async fn await_reply(
        &mut self,
        request: &Request,
        want_report: bool,
        deadline: Instant,
    ) -> Result<Option<SoundSettings>, SessionError> {
        loop {
            while let Some(decoded) = self.decoder.next_packet() {
                let packet = decoded?;
                debug!("RX: {}", packet);
                if packet.data_type.is_data() {
                    self.write_ack(&packet).await?;
                }

                let reply = CommandSet::parse_reply(&packet);
                if matches!(self.state, SessionState::AwaitingAck { .. })
                    && CommandSet::matches_request(&reply, request)
                {
                    // The next request reuses the ACK's sequence number
                    self.seq = packet.seq;
                    if !want_report {
                        return Ok(None);
                    }
                    self.set_state(SessionState::AwaitingReport);
                    continue;
                }

                match reply {
                    Reply::StatusReport { settings, .. }
                        if self.state == SessionState::AwaitingReport =>
                    {
                        return Ok(Some(settings));
                    }
                    Reply::StatusReport { kind, settings, .. } => {
                        info!("Device status ({:?}): {}", kind, settings);
                    }
                    Reply::Ack { seq } => {
                        debug!("Ignoring ACK seq={} (expected {})", seq, request.expected_ack_seq());
                    }
                    Reply::Unknown { data_type, .. } => {
                        debug!("Ignoring unhandled {} packet", data_type.as_str());
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::TimedOut(self.timeout));
            }
            match self.transport.read_available(deadline - now).await? {
                ReadEvent::Data(chunk) => self.decoder.push(&chunk),
                ReadEvent::Timeout => {}
                ReadEvent::Closed => return Err(SessionError::TransportClosed),
            }
        }
    }

    async fn write_ack(&mut self, packet: &Packet) -> Result<(), SessionError> {
        let ack = packet.ack_reply();
        debug!("TX: {}", ack);
        self.transport.write(&frame::encode(&ack)).await?;
        Ok(())
    }

    fn finish(&mut self, request: &Request, result: &Result<Option<SoundSettings>, SessionError>) {
        let name = request.command.name();
        let (outcome, next_state) = match result {
            Ok(_) => {
                info!("{} acknowledged (seq={})", name, request.seq);
                (Outcome::Acked, SessionState::Idle)
            }
            Err(SessionError::TimedOut(_)) => {
                warn!("{} timed out waiting for the device", name);
                (Outcome::TimedOut, SessionState::Idle)
            }
            Err(SessionError::Rejected(e)) => {
                warn!("{} rejected: {}", name, e);
                // A resend reuses this sequence number, so an ACK still
                // buffered behind the broken frame must not complete it
                self.decoder.clear();
                (Outcome::Rejected, SessionState::Idle)
            }
            Err(SessionError::TransportClosed) => {
                info!("Connection closed during {}", name);
                (Outcome::Failed, SessionState::Closed)
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                (Outcome::Failed, SessionState::Idle)
            }
        };
        self.last_outcome = Some(outcome);
        self.set_state(next_state);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::device::AmbientLevel;
    use crate::protocol::Payload;

    #[derive(Default)]
    struct Script {
        reads: VecDeque<ReadEvent>,
        written: Vec<Bytes>,
        fail_writes: bool,
    }

    /// Replays scripted reads; shares its log with the test through `Arc`.
    #[derive(Clone, Default)]
    struct MockTransport(Arc<Mutex<Script>>);

    impl MockTransport {
        fn push_frame(&self, packet: &Packet) {
            self.push_bytes(frame::encode(packet));
        }

        fn push_bytes(&self, bytes: Bytes) {
            self.0.lock().unwrap().reads.push_back(ReadEvent::Data(bytes));
        }

        fn push_event(&self, event: ReadEvent) {
            self.0.lock().unwrap().reads.push_back(event);
        }

        fn written(&self) -> Vec<Bytes> {
            self.0.lock().unwrap().written.clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            let mut script = self.0.lock().unwrap();
            if script.fail_writes {
                return Err(TransportError::Io(std::io::Error::other("write failed")));
            }
            script.written.push(Bytes::copy_from_slice(bytes));
            Ok(())
        }

        async fn read_available(
            &mut self,
            max_wait: Duration,
        ) -> Result<ReadEvent, TransportError> {
            let next = self.0.lock().unwrap().reads.pop_front();
            match next {
                Some(event) => Ok(event),
                None => {
                    tokio::time::sleep(max_wait).await;
                    Ok(ReadEvent::Timeout)
                }
            }
        }
    }

    fn session(transport: &MockTransport) -> SessionController<MockTransport> {
        SessionController::new(transport.clone(), CommandSet::default())
            .with_timeout(Duration::from_secs(2))
    }

    fn asl(level: i32) -> Command {
        Command::SetAmbientSoundLevel(AmbientLevel::new(level).unwrap())
    }

    fn status_push(seq: u8) -> Packet {
        let payload = Payload::new(vec![0x69, 0x02, 0x11, 0x01, 0x00, 0x01, 0x00, 0x05]).unwrap();
        Packet::command(seq, payload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_acknowledged() {
        let transport = MockTransport::default();
        transport.push_frame(&Packet::ack(1));
        let mut session = session(&transport);

        session.send(asl(10)).await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.last_outcome(), Some(Outcome::Acked));
        assert_eq!(
            &transport.written()[0][..],
            &[0x3E, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x08, 0x68, 0x02, 0x11, 0x01, 0x00, 0x01, 0x00, 0x0A, 0x9B, 0x3C]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_request_uses_ack_sequence() {
        let transport = MockTransport::default();
        transport.push_frame(&Packet::ack(1));
        let mut session = session(&transport);
        session.send(asl(3)).await.unwrap();
        assert_eq!(session.next_seq(), 1);

        // A stale ACK for seq 0 must not complete the second request
        transport.push_frame(&Packet::ack(1));
        transport.push_frame(&Packet::ack(0));
        session.send(asl(4)).await.unwrap();

        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1][2], 0x01);
        assert_eq!(session.next_seq(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_push_is_acked_and_ignored() {
        let transport = MockTransport::default();
        transport.push_frame(&status_push(0));
        transport.push_frame(&Packet::ack(1));
        let mut session = session(&transport);

        session.send(asl(10)).await.unwrap();

        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1], frame::encode(&Packet::ack(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_split_across_reads() {
        let transport = MockTransport::default();
        let ack = frame::encode(&Packet::ack(1));
        transport.push_bytes(ack.slice(..2));
        transport.push_bytes(ack.slice(2..5));
        transport.push_bytes(ack.slice(5..));
        let mut session = session(&transport);

        session.send(asl(0)).await.unwrap();
        assert_eq!(session.last_outcome(), Some(Outcome::Acked));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_reply_is_rejected() {
        let transport = MockTransport::default();
        transport.push_bytes(Bytes::from_static(&[0x3E, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0x3C]));
        let mut session = session(&transport);

        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Rejected(FramingError::ChecksumMismatch { .. })
        ));
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.last_outcome(), Some(Outcome::Rejected));

        transport.push_frame(&Packet::ack(1));
        session.send(asl(10)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_drops_input_buffered_behind_broken_frame() {
        let transport = MockTransport::default();
        let mut data = vec![0x3E, 0x01, 0x3C];
        data.extend_from_slice(&frame::encode(&Packet::ack(1)));
        transport.push_bytes(Bytes::from(data));
        let mut session = session(&transport);

        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected(FramingError::ChecksumMismatch { .. })));

        // The ACK that followed the broken frame is gone; the resend waits
        // for a fresh one
        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(_)));
        assert_eq!(transport.written().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_retry() {
        let transport = MockTransport::default();
        let mut session = session(&transport);

        let started = Instant::now();
        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(d) if d == Duration::from_secs(2)));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.last_outcome(), Some(Outcome::TimedOut));

        transport.push_frame(&Packet::ack(1));
        session.send(asl(10)).await.unwrap();
        assert_eq!(transport.written().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport() {
        let transport = MockTransport::default();
        transport.push_event(ReadEvent::Closed);
        let mut session = session(&transport);

        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
        assert_eq!(session.state(), SessionState::Closed);

        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
        assert_eq!(transport.written().len(), 1);

        session.reset();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_leaves_session_usable() {
        let transport = MockTransport::default();
        transport.0.lock().unwrap().fail_writes = true;
        let mut session = session(&transport);

        let err = session.send(asl(10)).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(!err.is_retryable());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.last_outcome(), Some(Outcome::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_send_leaves_session_busy() {
        let transport = MockTransport::default();
        let mut session = session(&transport).with_timeout(Duration::from_secs(5));

        let abandoned = tokio::time::timeout(Duration::from_secs(1), session.send(asl(10))).await;
        assert!(abandoned.is_err());
        assert_eq!(session.state(), SessionState::AwaitingAck { seq: 0 });
        assert!(matches!(
            session.send(asl(11)).await,
            Err(SessionError::Busy)
        ));

        session.reset();
        transport.push_frame(&Packet::ack(1));
        session.send(asl(11)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_sound_settings() {
        let transport = MockTransport::default();
        transport.push_frame(&Packet::ack(1));
        let report = Payload::new(vec![0x67, 0x02, 0x11, 0x01, 0x00, 0x01, 0x01, 0x0C]).unwrap();
        transport.push_frame(&Packet::command(0, report));
        let mut session = session(&transport);

        let settings = session.query_sound_settings().await.unwrap();
        assert_eq!(settings.ambient_level, Some(AmbientLevel::new(12).unwrap()));
        assert!(settings.focus_on_voice);

        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1], frame::encode(&Packet::ack(1)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_without_report_times_out() {
        let transport = MockTransport::default();
        transport.push_frame(&Packet::ack(1));
        let mut session = session(&transport);

        let err = session.query_sound_settings().await.unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_session_over_stream() {
        let (client, mut headset) = tokio::io::duplex(256);

        let device = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 64];
            loop {
                let n = headset.read(&mut buf).await.unwrap();
                decoder.push(&buf[..n]);
                if let Some(decoded) = decoder.next_packet() {
                    let packet = decoded.unwrap();
                    headset
                        .write_all(&frame::encode(&packet.ack_reply()))
                        .await
                        .unwrap();
                    return packet;
                }
            }
        });

        let mut session = SessionController::new(StreamTransport::new(client), CommandSet::default());
        session
            .send(Command::SetFocusOnVoice(true))
            .await
            .unwrap();

        let received = device.await.unwrap();
        assert_eq!(
            received.payload.as_bytes(),
            &[0x68, 0x02, 0x11, 0x01, 0x00, 0x01, 0x01, 0x0A]
        );
    }
}

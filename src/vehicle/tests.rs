use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use super::protocol::{
    Command, PositionUpdate, SDK_OPTION_OVERRIDE_LOCALIZATION, TelemetryEvent, decode_command,
    encode_event,
};
use super::scan::TrackScanner;
use super::session::{Session, SessionState, VehicleInfo};
use super::sim::{self, TrackLayout};
use super::track::{TrackLogEntry, TrackPieceKind};
use super::transport::{ChannelTransport, connect_tcp, pump_frames, read_frames};
use crate::config::{ScanConfig, SimConfig};
use crate::error::{AbortReason, Error};

type TestSession = Arc<Session<ChannelTransport>>;

async fn active_session() -> (TestSession, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (transport, mut outgoing) = ChannelTransport::pair();
    let session = Arc::new(Session::new(transport));
    assert_ok!(session.on_service_ready().await);
    assert_ok!(session.on_channels_ready().await);

    // Handshake frames
    outgoing.recv().await.unwrap();
    outgoing.recv().await.unwrap();
    (session, outgoing)
}

async fn next_command(outgoing: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Command {
    let frame = outgoing.recv().await.expect("link closed");
    decode_command(&frame).unwrap()
}

fn position(piece_id: u8, marker: u8, clockwise: bool) -> Vec<u8> {
    encode_event(&TelemetryEvent::PositionUpdate(PositionUpdate {
        position_marker: marker,
        raw_piece_id: piece_id,
        offset: 0.0,
        speed: 700,
        is_clockwise: clockwise,
    }))
}

fn spawn_scan(
    scanner: &Arc<TrackScanner<Session<ChannelTransport>>>,
) -> tokio::task::JoinHandle<crate::error::Result<Vec<TrackLogEntry>>> {
    let scanner = Arc::clone(scanner);
    tokio::spawn(async move { scanner.scan_track().await })
}

fn oval_lap() -> Vec<TrackLogEntry> {
    use TrackPieceKind::*;
    let mut lap = Vec::new();
    for _ in 0..2 {
        lap.extend((0..3).map(|m| TrackLogEntry::new(Straight, true, m)));
        lap.extend((0..4).map(|m| TrackLogEntry::new(Curve, true, m)));
    }
    lap.push(TrackLogEntry::new(PreFinishLine, true, 0));
    lap.push(TrackLogEntry::new(StartFinish, true, 0));
    lap
}

#[tokio::test]
async fn test_handshake_sends_sdk_mode_then_version() {
    let (transport, mut outgoing) = ChannelTransport::pair();
    let session = Session::new(transport);

    assert_eq!(session.state().await, SessionState::Discovered);
    assert_ok!(session.on_service_ready().await);
    assert_eq!(session.state().await, SessionState::ServicesResolved);
    assert_ok!(session.on_channels_ready().await);
    assert_eq!(session.state().await, SessionState::Active);

    assert_eq!(
        outgoing.recv().await.unwrap(),
        vec![3, 0x90, 0x01, SDK_OPTION_OVERRIDE_LOCALIZATION]
    );
    assert_eq!(outgoing.recv().await.unwrap(), vec![1, 0x18]);
}

#[tokio::test]
async fn test_commands_rejected_before_handshake() {
    let (transport, mut outgoing) = ChannelTransport::pair();
    let session = Session::new(transport);

    let err = assert_err!(session.set_speed(700, 700).await);
    assert!(matches!(err, Error::NotActive(SessionState::Discovered)));
    let err = assert_err!(session.subscribe(4).await);
    assert!(matches!(err, Error::NotActive(SessionState::Discovered)));
    assert!(outgoing.try_recv().is_err());
}

#[tokio::test]
async fn test_lifecycle_out_of_order() {
    let (transport, _outgoing) = ChannelTransport::pair();
    let session = Session::new(transport);

    let err = assert_err!(session.on_channels_ready().await);
    assert!(matches!(
        err,
        Error::InvalidTransition {
            state: SessionState::Discovered,
            ..
        }
    ));

    assert_ok!(session.on_service_ready().await);
    let err = assert_err!(session.on_service_ready().await);
    assert!(matches!(err, Error::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_handshake_failure_disconnects() {
    let (transport, outgoing) = ChannelTransport::pair();
    drop(outgoing);
    let session = Session::new(transport);

    assert_ok!(session.on_service_ready().await);
    let err = assert_err!(session.on_channels_ready().await);
    assert!(matches!(err, Error::LinkClosed));
    assert_eq!(session.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_send_failure_disconnects() {
    let (session, outgoing) = active_session().await;
    drop(outgoing);

    let err = assert_err!(session.ping().await);
    assert!(matches!(err, Error::LinkClosed));
    assert_eq!(session.state().await, SessionState::Disconnected);
    let err = assert_err!(session.ping().await);
    assert!(matches!(err, Error::NotActive(SessionState::Disconnected)));
}

#[tokio::test]
async fn test_disconnect_ends_subscriptions() {
    let (session, mut outgoing) = active_session().await;
    let mut events = assert_ok!(session.subscribe(4).await);

    assert_ok!(session.disconnect().await);
    assert_eq!(next_command(&mut outgoing).await, Command::Disconnect);
    assert_eq!(session.state().await, SessionState::Disconnected);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_engine_light_sends_one_pattern_per_channel() {
    use super::protocol::{LightChannel, LightEffect};

    let (session, mut outgoing) = active_session().await;
    assert_ok!(session.set_engine_light(10, 4, 0, LightEffect::Throb, 60).await);

    let mut channels = Vec::new();
    for _ in 0..3 {
        match next_command(&mut outgoing).await {
            Command::SetLightsPattern {
                channel,
                effect,
                start,
                end,
                cycles_per_min,
            } => {
                assert_eq!(effect, LightEffect::Throb);
                assert_eq!(start, 0);
                assert_eq!(cycles_per_min, 60);
                channels.push((channel, end));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
    assert_eq!(
        channels,
        vec![
            (LightChannel::Red, 10),
            (LightChannel::Green, 4),
            (LightChannel::Blue, 0),
        ]
    );
}

#[tokio::test]
async fn test_frames_reach_subscribers_in_order() {
    let (session, _outgoing) = active_session().await;
    let mut events = assert_ok!(session.subscribe(1).await);

    let feeder = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            for marker in 0..5 {
                session.on_frame(&position(40, marker, false)).await.unwrap();
            }
        })
    };

    for marker in 0..5 {
        match events.recv().await.unwrap() {
            TelemetryEvent::PositionUpdate(update) => assert_eq!(update.position_marker, marker),
            other => panic!("unexpected event {:?}", other),
        }
    }
    feeder.await.unwrap();
}

#[tokio::test]
async fn test_bad_frames_are_reported_not_dispatched() {
    let (session, _outgoing) = active_session().await;
    let mut events = assert_ok!(session.subscribe(4).await);

    let err = assert_err!(session.on_frame(&[3, 0x19]).await);
    assert!(matches!(err, Error::Parse(_)));

    let event = assert_ok!(session.on_frame(&[2, 0xee, 0x01]).await);
    assert_eq!(
        event,
        TelemetryEvent::Unknown {
            raw_id: 0xee,
            raw_bytes: vec![2, 0xee, 0x01],
        }
    );
    assert_eq!(events.recv().await.unwrap(), event);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_records_version_and_battery() {
    let (session, _outgoing) = active_session().await;

    assert_ok!(
        session
            .on_frame(&encode_event(&TelemetryEvent::VersionResponse { version: 0x2e68 }))
            .await
    );
    assert_ok!(
        session
            .on_frame(&encode_event(&TelemetryEvent::BatteryResponse { level: 3800 }))
            .await
    );

    assert_eq!(
        session.info().await,
        VehicleInfo {
            model_id: None,
            version: Some(0x2e68),
            battery_level: Some(3800),
        }
    );
}

#[tokio::test]
async fn test_records_model_from_advertisement() {
    let (transport, _outgoing) = ChannelTransport::pair();
    let session = Session::new(transport);
    assert_eq!(session.info().await.model_name(), None);

    session.set_model_id(0x08).await;
    let info = session.info().await;
    assert_eq!(info.model_id, Some(0x08));
    assert_eq!(info.model_name(), Some("groundshock"));
}

#[tokio::test]
async fn test_scan_collapses_repeated_reading() {
    use TrackPieceKind::*;

    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    let scan = spawn_scan(&scanner);

    assert_eq!(
        next_command(&mut outgoing).await,
        Command::SetSpeed {
            speed: 700,
            accel: 700
        }
    );

    let frames = [
        position(40, 2, false), // before the first crossing, discarded
        position(33, 4, false),
        position(40, 1, false),
        position(40, 1, false),
        position(17, 2, false),
        position(39, 0, false),
        position(34, 5, false),
    ];
    for frame in &frames {
        assert_ok!(session.on_frame(frame).await);
    }

    assert_eq!(
        next_command(&mut outgoing).await,
        Command::SetSpeed {
            speed: 0,
            accel: 2800
        }
    );

    let lap = scan.await.unwrap().unwrap();
    assert_eq!(
        lap,
        vec![
            TrackLogEntry::new(Straight, false, 1),
            TrackLogEntry::new(Curve, false, 2),
            TrackLogEntry::new(Straight, false, 0),
            TrackLogEntry::new(PreFinishLine, false, 0),
            TrackLogEntry::new(StartFinish, false, 0),
        ]
    );
    assert_eq!(scanner.track_log().await, lap);
    assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn test_scan_stops_vehicle_at_crossing_limit() {
    use TrackPieceKind::*;

    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    let scan = spawn_scan(&scanner);
    next_command(&mut outgoing).await;

    // The pre-finish marker is never read.
    let frames = [
        position(33, 4, false),
        position(40, 0, false),
        position(33, 5, false),
        position(40, 1, false),
        position(33, 4, false),
    ];
    for frame in &frames {
        assert_ok!(session.on_frame(frame).await);
    }

    let lap = scan.await.unwrap().unwrap();
    assert_eq!(
        lap,
        vec![
            TrackLogEntry::new(Straight, false, 0),
            TrackLogEntry::new(PreFinishLine, false, 0),
            TrackLogEntry::new(StartFinish, false, 0),
        ]
    );
    assert_eq!(
        next_command(&mut outgoing).await,
        Command::SetSpeed {
            speed: 0,
            accel: 2800
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_scan_times_out_without_progress() {
    let (session, mut outgoing) = active_session().await;
    let config = ScanConfig {
        progress_timeout_ms: 500,
        ..ScanConfig::default()
    };
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), config));
    let scan = spawn_scan(&scanner);

    next_command(&mut outgoing).await;
    // The same marker over and over is not progress.
    for _ in 0..3 {
        assert_ok!(session.on_frame(&position(40, 1, true)).await);
    }

    let err = scan.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ScanTimedOut(d) if d == Duration::from_millis(500)));
    assert_eq!(
        next_command(&mut outgoing).await,
        Command::SetSpeed {
            speed: 0,
            accel: 2800
        }
    );
    assert!(scanner.track_log().await.is_empty());
}

#[tokio::test]
async fn test_scan_cancelled() {
    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    let scan = spawn_scan(&scanner);

    next_command(&mut outgoing).await;
    assert_ok!(session.on_frame(&position(33, 4, true)).await);
    scanner.cancel_handle().cancel();

    let err = scan.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ScanAborted(AbortReason::Cancelled)));
    assert!(matches!(
        next_command(&mut outgoing).await,
        Command::SetSpeed { speed: 0, .. }
    ));
    assert!(scanner.track_log().await.is_empty());
}

#[tokio::test]
async fn test_cancel_before_scan_is_ignored() {
    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    scanner.cancel_handle().cancel();

    let scan = spawn_scan(&scanner);
    next_command(&mut outgoing).await;
    for frame in [position(33, 4, true), position(40, 0, true), position(34, 5, true)] {
        assert_ok!(session.on_frame(&frame).await);
    }

    let lap = scan.await.unwrap().unwrap();
    assert_eq!(lap.len(), 3);
}

#[tokio::test]
async fn test_scan_aborted_on_link_loss() {
    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    let scan = spawn_scan(&scanner);

    next_command(&mut outgoing).await;
    assert_ok!(session.on_frame(&position(33, 4, true)).await);
    session.on_link_lost().await;

    let err = scan.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ScanAborted(AbortReason::LinkLost)));
    assert_eq!(session.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_second_scan_rejected_while_running() {
    let (session, mut outgoing) = active_session().await;
    let scanner = Arc::new(TrackScanner::new(Arc::clone(&session), ScanConfig::default()));
    let scan = spawn_scan(&scanner);

    next_command(&mut outgoing).await;
    assert!(scanner.is_scanning());
    let err = assert_err!(scanner.scan_track().await);
    assert!(matches!(err, Error::ScanAlreadyInProgress));

    scanner.cancel_handle().cancel();
    assert_err!(scan.await.unwrap());
    assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn test_scan_requires_active_session() {
    let (transport, _outgoing) = ChannelTransport::pair();
    let session = Arc::new(Session::new(transport));
    let scanner = TrackScanner::new(session, ScanConfig::default());

    let err = assert_err!(scanner.scan_track().await);
    assert!(matches!(err, Error::NotActive(SessionState::Discovered)));
    assert!(!scanner.is_scanning());
}

async fn scan_simulated_oval(sim_config: SimConfig) -> (Vec<TrackLogEntry>, TestSession) {
    let (transport, telemetry) = sim::spawn(TrackLayout::oval(), sim_config, 16);
    let session = Arc::new(Session::new(transport));
    tokio::spawn(pump_frames(telemetry, Arc::clone(&session)));
    assert_ok!(session.on_service_ready().await);
    assert_ok!(session.on_channels_ready().await);

    let scanner = TrackScanner::new(Arc::clone(&session), ScanConfig::default());
    let lap = assert_ok!(scanner.scan_track().await);
    (lap, session)
}

#[tokio::test(start_paused = true)]
async fn test_scan_simulated_oval() {
    let (lap, session) = scan_simulated_oval(SimConfig::default()).await;
    assert_eq!(lap, oval_lap());
    assert_eq!(session.info().await.version, Some(0x2e68));
}

#[tokio::test(start_paused = true)]
async fn test_scan_simulated_oval_with_repeated_readings() {
    let config = SimConfig {
        repeat_readings: true,
        ..SimConfig::default()
    };
    let (lap, _session) = scan_simulated_oval(config).await;
    assert_eq!(lap, oval_lap());
}

#[tokio::test(start_paused = true)]
async fn test_scan_simulated_oval_from_finish_line() {
    let config = SimConfig {
        start_piece: 7,
        ..SimConfig::default()
    };
    let (lap, _session) = scan_simulated_oval(config).await;
    assert_eq!(lap, oval_lap());
}

#[tokio::test]
async fn test_scan_over_tcp_bridge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let config = SimConfig {
        tick_ms: 5,
        ..SimConfig::default()
    };
    tokio::spawn(sim::serve_on(listener, TrackLayout::oval(), config));

    let (transport, reader) = assert_ok!(connect_tcp(addr).await);
    let session = Arc::new(Session::new(transport));
    let reader_task = tokio::spawn(read_frames(reader, Arc::clone(&session)));
    assert_ok!(session.on_service_ready().await);
    assert_ok!(session.on_channels_ready().await);

    let scanner = TrackScanner::new(Arc::clone(&session), ScanConfig::default());
    let lap = assert_ok!(scanner.scan_track().await);
    assert_eq!(lap, oval_lap());

    // The simulator hangs up after a disconnect, which ends the reader.
    assert_ok!(session.disconnect().await);
    reader_task.await.unwrap();
    assert_eq!(session.state().await, SessionState::Disconnected);
}

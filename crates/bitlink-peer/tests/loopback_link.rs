//! End-to-end exchanges between two engines over an in-memory link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bitlink_frame::{encode_frame, FrameKind};
use bitlink_peer::{LinkedVar, Peer, PeerError};
use bitlink_transport::{Loopback, Transport};

/// Poll `peer` from a background thread until `stop` is raised, the way a
/// device's main loop would.
fn spawn_responder(mut peer: Peer<Loopback>, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            peer.poll();
            thread::sleep(Duration::from_micros(200));
        }
    })
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn read_full_and_partial_values() {
    let (a, b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    let mut responder = Peer::new(b, 4, 4);

    let var = LinkedVar::value(0xDEAD_BEEFu32);
    responder.link_variable(3, &var).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_responder(responder, Arc::clone(&stop));

    assert_eq!(requester.read_value::<u32>(3).unwrap(), 0xDEAD_BEEF);

    // A shorter read returns the leading bytes of the same variable.
    let mut prefix = [0u8; 2];
    requester.read(3, &mut prefix).unwrap();
    assert_eq!(prefix, [0xEF, 0xBE]);

    assert!(requester.last_comm_age() < Duration::from_secs(1));

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn write_reaches_the_remote_variable() {
    let (a, b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    let mut responder = Peer::new(b, 4, 4);

    let var = LinkedVar::value(0u16);
    responder.link_variable(0, &var).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_responder(responder, Arc::clone(&stop));

    requester.write_value(0, 0x1234u16).unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || var.get::<u16>() == Some(0x1234)),
        "write never landed"
    );

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn invoke_runs_the_remote_callback() {
    let (a, b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    let mut responder = Peer::new(b, 4, 4);

    let calls: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    responder
        .link_function(1, move |args| {
            sink.lock().unwrap().push(args.to_vec());
        })
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_responder(responder, Arc::clone(&stop));

    requester.invoke(1, &[9, 8, 7]).unwrap();
    requester.invoke_bare(1).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || calls.lock().unwrap().len() == 2),
        "callbacks never ran"
    );
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], vec![9, 8, 7]);
    assert_eq!(calls[1], vec![0]);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn unanswered_read_times_out_and_recovers() {
    let (a, b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    let mut responder = Peer::new(b, 4, 4);
    requester.set_timeout(Duration::from_millis(20));

    let var = LinkedVar::value(7u8);
    responder.link_variable(0, &var).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_responder(responder, Arc::clone(&stop));

    // Index 2 is unlinked on the responder: no answer, by design.
    let started = Instant::now();
    let mut out = [0u8; 1];
    let err = requester.read(2, &mut out).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PeerError::Timeout));
    assert!(elapsed >= Duration::from_millis(20), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "returned far too late: {elapsed:?}");

    // The link is still healthy for the next request.
    assert_eq!(requester.read_value::<u8>(0).unwrap(), 7);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn missing_headroom_aborts_without_sending() {
    // Queue capacity below the engine's required margin of two frames.
    let (a, mut b) = Loopback::pair_with_capacity(10);
    let mut requester = Peer::new(a, 4, 4);
    requester.set_timeout(Duration::from_millis(10));

    let mut out = [0u8; 1];
    assert!(matches!(
        requester.read(0, &mut out).unwrap_err(),
        PeerError::Timeout
    ));
    assert_eq!(b.bytes_available(), 0, "request was sent despite no headroom");
}

#[test]
fn size_bounds_reject_before_any_io() {
    let (a, mut b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);

    let mut empty = [0u8; 0];
    assert!(matches!(
        requester.read(0, &mut empty).unwrap_err(),
        PeerError::InvalidSize { size: 0 }
    ));
    let mut nine = [0u8; 9];
    assert!(matches!(
        requester.read(0, &mut nine).unwrap_err(),
        PeerError::InvalidSize { size: 9 }
    ));
    assert!(matches!(
        requester.write(0, &[0u8; 9]).unwrap_err(),
        PeerError::InvalidSize { size: 9 }
    ));

    assert_eq!(b.bytes_available(), 0);
}

#[test]
fn foreign_response_is_a_desync_error() {
    let (a, mut b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    requester.set_timeout(Duration::from_millis(200));

    // Hand-rolled peer: swallow the request, answer for the wrong index.
    let handle = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(2);
        while b.bytes_available() < 2 {
            assert!(Instant::now() < deadline, "request never arrived");
            thread::sleep(Duration::from_micros(100));
        }
        while b.bytes_available() > 0 {
            b.read_byte();
        }
        let reply = encode_frame(FrameKind::ReadResponse, 2, &[0xFF]).unwrap();
        b.write_bytes(reply.as_bytes());
    });

    let mut out = [0u8; 1];
    let err = requester.read(1, &mut out).unwrap_err();
    assert!(matches!(err, PeerError::Desync));

    handle.join().unwrap();
}

#[test]
fn response_after_line_noise_still_matches() {
    let (a, mut b) = Loopback::pair();
    let mut requester = Peer::new(a, 4, 4);
    requester.set_timeout(Duration::from_millis(500));

    let handle = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(2);
        while b.bytes_available() < 2 {
            assert!(Instant::now() < deadline, "request never arrived");
            thread::sleep(Duration::from_micros(100));
        }
        while b.bytes_available() > 0 {
            b.read_byte();
        }
        // Line noise, then the genuine answer: the start marker resyncs.
        b.write_bytes(&[0x01, 0x55, 0x7E]);
        let reply = encode_frame(FrameKind::ReadResponse, 6, &[0x2A, 0x00]).unwrap();
        b.write_bytes(reply.as_bytes());
    });

    assert_eq!(requester.read_value::<u16>(6).unwrap(), 42);
    handle.join().unwrap();
}

//! Outbound backpressure: once the kernel stops taking bytes, `put` queues
//! and reports `Pending`, and the event loop later drains everything in
//! FIFO order.

use std::io::{self, Read};
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::Duration;

use ccn_client::{Handle, SendState};
use ccn_wire::{SkeletonDecoder, encode_content_object, name_from_uri, parse_content_object};

const BULK_MSGS: usize = 64;

#[test]
fn queued_output_drains_in_order_once_the_daemon_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        // Let the sender hit a full kernel buffer before reading a byte.
        thread::sleep(Duration::from_millis(300));
        conn.set_read_timeout(Some(Duration::from_millis(800))).unwrap();
        let mut dec = SkeletonDecoder::new();
        let mut buf = Vec::new();
        let mut messages = Vec::new();
        let mut chunk = [0_u8; 16 * 1024];
        loop {
            match conn.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => panic!("daemon read failed: {e}"),
            }
            while dec.index() < buf.len() {
                dec.feed(&buf[dec.index()..]);
                assert!(!dec.is_error(), "stream corrupted in transit");
                if dec.at_boundary() && dec.index() > 0 {
                    messages.push(buf[..dec.index()].to_vec());
                    buf.drain(..dec.index());
                    dec.reset();
                }
            }
        }
        assert!(buf.is_empty(), "daemon saw a torn trailing message");
        messages
    });

    let mut h = Handle::new().unwrap();
    h.connect(Some(path.to_str().unwrap())).unwrap();

    let bulk = encode_content_object(&name_from_uri("/bulk"), &[0x42; 32 * 1024]);
    let mut sent = 0_usize;
    let mut queued = false;
    for _ in 0..BULK_MSGS {
        match h.put(&bulk).unwrap() {
            SendState::Flushed => sent += 1,
            SendState::Pending => {
                sent += 1;
                queued = true;
                break;
            }
        }
    }
    assert!(queued, "kernel never pushed back; test proves nothing");
    assert!(h.output_is_pending());

    // One more behind the jam; it must come out last.
    let marker = encode_content_object(&name_from_uri("/bulk/marker"), b"fin");
    assert_eq!(h.put(&marker).unwrap(), SendState::Pending);
    sent += 1;

    let _ = h.run(Some(Duration::from_millis(600)));
    assert!(!h.output_is_pending(), "loop failed to drain the queue");
    drop(h);

    let messages = daemon.join().unwrap();
    assert_eq!(messages.len(), sent);
    let mut comps = Vec::new();
    for msg in &messages[..sent - 1] {
        assert_eq!(msg.len(), bulk.len());
        parse_content_object(msg, &mut comps).unwrap();
    }
    assert_eq!(messages[sent - 1], marker);
}

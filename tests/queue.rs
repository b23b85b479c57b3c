mod support;
use support::*;

use timewheel::Wheel;

use std::sync::{mpsc, Arc, Mutex};

#[test]
fn same_tick_fires_in_insertion_order() {
    init_log();

    // A coarse tick so several timers share one bucket.
    let wheel = Wheel::builder().tick(ms(50)).size(8).build();

    let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    // One shared absolute expiration: all five land in the same slot turn.
    let expiration = now_ms() + 130;

    for i in 0..5 {
        let order = order.clone();
        let tx = tx.clone();
        wheel.schedule(expiration, move || {
            order.lock().unwrap().push(i);
            tx.send(()).unwrap();
        });
    }

    for _ in 0..5 {
        rx.recv_timeout(ms(2_000)).expect("bucket flushed");
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn earlier_expirations_fire_first() {
    let wheel = Wheel::builder().tick(ms(10)).size(8).build();

    let (tx, rx) = mpsc::channel();

    let late = tx.clone();
    wheel.after(ms(120), move || {
        late.send("late").unwrap();
    });
    let early = tx;
    wheel.after(ms(40), move || {
        early.send("early").unwrap();
    });

    assert_eq!(rx.recv_timeout(ms(2_000)), Ok("early"));
    assert_eq!(rx.recv_timeout(ms(2_000)), Ok("late"));
}

#[test]
fn emptied_bucket_does_not_stall_the_driver() {
    // Stop the only timer of the earliest bucket, then make sure a later
    // timer still fires: the driver must skip the dead head instead of
    // sleeping on it.
    let wheel = Wheel::builder().tick(ms(10)).size(8).build();

    let first = wheel.after(ms(30), || {});

    let (tx, rx) = mpsc::channel();
    wheel.after(ms(60), move || {
        tx.send(()).unwrap();
    });

    assert!(first.stop());

    rx.recv_timeout(ms(2_000))
        .expect("driver stalled on an emptied bucket");
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[test]
fn burst_then_quiet_then_burst() {
    // The driver winds down once the queue drains and restarts for new work.
    let wheel = Wheel::new();

    for round in 0..3 {
        let (tx, rx) = mpsc::channel();

        for _ in 0..10 {
            let tx = tx.clone();
            wheel.after(ms(20), move || {
                tx.send(round).unwrap();
            });
        }

        for _ in 0..10 {
            assert_eq!(rx.recv_timeout(ms(2_000)), Ok(round));
        }

        std::thread::sleep(ms(100));
    }
}

mod support;
use support::*;

use timewheel::{Every, Wheel};

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

#[test]
fn repeat_fires_exactly_count_times() {
    init_log();

    let wheel = Wheel::new();
    let (tx, rx) = mpsc::channel();

    let _timer = wheel.repeat(
        ms(100),
        Every::new(ms(100), 10, move || {
            tx.send(Instant::now()).unwrap();
        }),
    );

    let mut fires = Vec::new();
    for i in 0..10 {
        let fired = rx
            .recv_timeout(ms(2_000))
            .unwrap_or_else(|_| panic!("fire {} never arrived", i));
        fires.push(fired);
    }

    // The budget is exhausted: no eleventh fire.
    assert!(rx.recv_timeout(ms(400)).is_err());

    for gap in fires.windows(2) {
        let delta = gap[1] - gap[0];
        assert!(delta >= ms(80), "consecutive fires only {:?} apart", delta);
        assert!(delta <= ms(500), "consecutive fires {:?} apart", delta);
    }
}

#[test]
fn repeat_zero_count_never_runs() {
    let wheel = Wheel::new();

    let fired = Arc::new(AtomicUsize::new(0));
    let count = fired.clone();

    wheel.repeat(
        ms(10),
        Every::new(ms(10), 0, move || {
            count.fetch_add(1, SeqCst);
        }),
    );

    thread::sleep(ms(150));
    assert_eq!(fired.load(SeqCst), 0);
}

#[test]
fn repeat_forever_runs_until_stopped() {
    init_log();

    let wheel = Wheel::new();

    let fired = Arc::new(AtomicUsize::new(0));
    let count = fired.clone();

    let timer = wheel.repeat(
        ms(20),
        Every::forever(ms(20), move || {
            count.fetch_add(1, SeqCst);
        }),
    );

    thread::sleep(ms(300));
    timer.stop();

    let at_stop = fired.load(SeqCst);
    assert!(at_stop >= 5, "only {} fires in 300ms", at_stop);

    // At most one firing that was already claimed can still land.
    thread::sleep(ms(200));
    let after = fired.load(SeqCst);
    assert!(after <= at_stop + 1, "kept firing after stop: {} -> {}", at_stop, after);
}

#[test]
fn repeat_with_custom_policy() {
    // A policy that doubles its interval each firing and gives up after
    // three.
    struct Doubling {
        interval: i64,
        fired: usize,
        tx: mpsc::Sender<usize>,
    }

    impl timewheel::Task for Doubling {
        fn execute(&mut self) {
            self.fired += 1;
            self.tx.send(self.fired).unwrap();
        }
    }

    impl timewheel::LoopTask for Doubling {
        fn next(&mut self, previous: i64, now: i64) -> i64 {
            if self.fired >= 3 {
                return previous;
            }
            self.interval *= 2;
            now.max(previous) + self.interval
        }
    }

    let wheel = Wheel::new();
    let (tx, rx) = mpsc::channel();

    wheel.repeat(
        ms(10),
        Doubling {
            interval: 10,
            fired: 0,
            tx,
        },
    );

    // 10ms, then +20ms, then +40ms.
    assert_eq!(rx.recv_timeout(ms(1_000)), Ok(1));
    assert_eq!(rx.recv_timeout(ms(1_000)), Ok(2));
    assert_eq!(rx.recv_timeout(ms(1_000)), Ok(3));
    assert!(rx.recv_timeout(ms(300)).is_err());
}
